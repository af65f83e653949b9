mod init;
pub use init::cmd_init;

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use tracing::{debug, info};

use crate::cli::commands::*;
use crate::cli::output::*;
use crate::editor::{Command, TrackEditor, TrackEvent};
use crate::io::api::TrackApi;
use crate::io::autosave::{Autosaver, SaveCoordinator, SaveEvent, SaveOutcome};
use crate::io::config_io;
use crate::io::file_api::FileApi;
use crate::model::config::StoreConfig;
use crate::model::stage::StageKind;
use crate::model::track::{Track, TrackDraft};
use crate::ops::linked::ProgressUpdate;
use crate::ops::track_ops::{self, InsertPosition, MilestonePatch, StagePatch};
use crate::ops::{check, reorder};

type CliResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

pub fn dispatch(cli: Cli) -> CliResult {
    let json = cli.json;
    let dir = cli.store_dir.as_deref();
    let session = || Session::open(dir);

    match cli.command {
        // Init runs before store discovery
        Commands::Init => cmd_init(dir),

        // Read commands
        Commands::List => cmd_list(&session()?, json),
        Commands::Show(args) => cmd_show(&session()?, args, json),
        Commands::Progress(args) => cmd_progress(&session()?, args, json),
        Commands::Check(args) => cmd_check(&session()?, args, json),
        Commands::Export(args) => cmd_export(&session()?, args),

        // Write commands
        Commands::New(args) => cmd_new(&session()?, args, json),
        Commands::Milestone(cmd) => cmd_milestone(&session()?, cmd, json),
        Commands::Stage(cmd) => cmd_stage(&session()?, cmd, json),
        Commands::Complete(args) => cmd_complete(&session()?, args, json),
        Commands::Reopen(args) => cmd_reopen(&session()?, args, json),
        Commands::Item(cmd) => cmd_item(&session()?, cmd, json),
        Commands::Import(args) => cmd_import(&session()?, args, json),
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// An opened store: its config and the API reads and writes go through
struct Session {
    config: StoreConfig,
    api: Arc<dyn TrackApi>,
}

impl Session {
    fn open(dir: Option<&str>) -> CliResult<Session> {
        let start = match dir {
            Some(dir) => std::fs::canonicalize(dir)
                .map_err(|e| format!("cannot resolve -C path '{}': {}", dir, e))?,
            None => std::env::current_dir()?,
        };
        let store_dir = config_io::discover_store(&start)?;
        let config = config_io::read_config(&store_dir)?;
        debug!(store = %store_dir.display(), "store opened");
        let api = FileApi::open(
            &store_dir,
            Duration::from_millis(config.store.lock_timeout_ms),
        );
        Ok(Session {
            config,
            api: Arc::new(api),
        })
    }

    fn load(&self, track_id: &str) -> CliResult<Track> {
        Ok(self.api.get_track(track_id)?)
    }

    fn autosave_interval(&self) -> Duration {
        Duration::from_secs(self.config.autosave.interval_secs.max(1))
    }
}

/// Save the editor's track through the autosave path and adopt the id the
/// store assigns when the track is new. Returns the id it was saved under.
fn persist(
    session: &Session,
    editor: &mut TrackEditor,
    progress: Vec<ProgressUpdate>,
) -> CliResult<String> {
    let coordinator = SaveCoordinator::from_api(session.api.as_ref())?;
    let saver = Autosaver::spawn(
        Arc::clone(&session.api),
        coordinator,
        session.autosave_interval(),
    );
    saver.submit(editor.version(), editor.track());
    for update in progress {
        saver.push_progress(&editor.track().id, update);
    }

    let outcome = saver.flush()?;
    for event in saver.poll() {
        if let SaveEvent::Adopted { remote_id, .. } = event {
            editor.adopt_remote_id(&remote_id);
        }
    }
    match &outcome {
        SaveOutcome::Created { remote_id, .. } => info!(id = %remote_id, "track created"),
        SaveOutcome::Updated { id, version } => debug!(id = %id, version, "track saved"),
        SaveOutcome::UpToDate => debug!("nothing to save"),
    }
    Ok(editor.track().id.clone())
}

/// Load a track, run `edit` against an editor for it, and save if anything
/// changed. Returns whatever `edit` returns.
fn with_editor<T>(
    session: &Session,
    track_id: &str,
    edit: impl FnOnce(&mut TrackEditor) -> CliResult<T>,
) -> CliResult<T> {
    let mut editor = TrackEditor::new(session.load(track_id)?);
    let events = editor.subscribe();
    let result = edit(&mut editor)?;

    if editor.version() == 0 {
        debug!(track = track_id, "no changes");
        return Ok(result);
    }
    let progress = events
        .try_iter()
        .filter_map(|event| match event {
            TrackEvent::Progress(update) => Some(update),
            _ => None,
        })
        .collect();
    persist(session, &mut editor, progress)?;
    Ok(result)
}

fn print_created(id: &str, json: bool) -> CliResult {
    if json {
        let out = CreatedJson { id: id.to_string() };
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!("{}", id);
    }
    Ok(())
}

fn insert_position(top: bool, after: Option<String>) -> InsertPosition {
    if top {
        InsertPosition::Top
    } else if let Some(id) = after {
        InsertPosition::After(id)
    } else {
        InsertPosition::Bottom
    }
}

fn parse_date(s: &str) -> CliResult<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|e| format!("invalid date '{}' (expected YYYY-MM-DD): {}", s, e).into())
}

/// `"none"` clears a date; anything else must parse.
fn parse_date_patch(s: Option<&str>) -> CliResult<Option<Option<NaiveDate>>> {
    match s {
        None => Ok(None),
        Some("none") => Ok(Some(None)),
        Some(s) => Ok(Some(Some(parse_date(s)?))),
    }
}

// ---------------------------------------------------------------------------
// Read command handlers
// ---------------------------------------------------------------------------

fn cmd_list(session: &Session, json: bool) -> CliResult {
    let mut ids = session.api.list_track_ids()?;
    ids.sort();
    let tracks = ids
        .iter()
        .map(|id| session.load(id))
        .collect::<CliResult<Vec<Track>>>()?;

    if json {
        let out: Vec<TrackSummaryJson> = tracks.iter().map(track_summary).collect();
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else if tracks.is_empty() {
        println!("no tracks (create one with `adapt new <title>`)");
    } else {
        for track in &tracks {
            println!("{}", format_track_line(track));
        }
    }
    Ok(())
}

fn cmd_show(session: &Session, args: TrackArg, json: bool) -> CliResult {
    let track = session.load(&args.track)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&track)?);
    } else {
        for line in format_track_detail(&track) {
            println!("{}", line);
        }
    }
    Ok(())
}

fn cmd_progress(session: &Session, args: TrackArg, json: bool) -> CliResult {
    let track = session.load(&args.track)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&progress_to_json(&track))?);
    } else {
        for line in format_progress(&track) {
            println!("{}", line);
        }
    }
    Ok(())
}

fn cmd_check(session: &Session, args: TrackArg, json: bool) -> CliResult {
    let track = session.load(&args.track)?;
    let result = check::check_track(&track);
    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        for line in format_check_result(&result) {
            println!("{}", line);
        }
    }
    Ok(())
}

fn cmd_export(session: &Session, args: TrackArg) -> CliResult {
    let track = session.load(&args.track)?;
    println!("{}", serde_json::to_string_pretty(&track)?);
    Ok(())
}

// ---------------------------------------------------------------------------
// Track handlers
// ---------------------------------------------------------------------------

fn cmd_new(session: &Session, args: NewArgs, json: bool) -> CliResult {
    let track = track_ops::new_local_track(args.title, args.description.unwrap_or_default());
    let mut editor = TrackEditor::new(track);
    let id = persist(session, &mut editor, Vec::new())?;
    print_created(&id, json)
}

/// Accepts a full track (with `id`) or a draft without one. A track whose id
/// is not in the store is created under a new id; a draft also gets fresh
/// milestone, stage and item ids.
fn cmd_import(session: &Session, args: ImportArgs, json: bool) -> CliResult {
    let text = std::fs::read_to_string(&args.file)
        .map_err(|e| format!("could not read {}: {}", args.file, e))?;
    let value: serde_json::Value =
        serde_json::from_str(&text).map_err(|e| format!("invalid JSON in {}: {}", args.file, e))?;

    let mut track = if value.get("id").is_some_and(|id| id.is_string()) {
        serde_json::from_value::<Track>(value)?
    } else {
        let draft: TrackDraft = serde_json::from_value(value)?;
        let mut track = track_ops::new_local_track(draft.title, draft.description);
        track.milestones = draft.milestones;
        track
    };

    let result = check::check_track(&track);
    if !result.valid {
        for line in format_check_result(&result) {
            eprintln!("{}", line);
        }
        return Err(format!("{} was not imported", args.file).into());
    }

    // A track that will be created may be a copy of one already stored
    if !session.api.list_track_ids()?.contains(&track.id) {
        track_ops::reassign_ids(&mut track);
    }

    let mut editor = TrackEditor::new(track);
    let id = persist(session, &mut editor, Vec::new())?;
    if !json {
        eprintln!("imported {} ({} stages)", args.file, editor.track().stages().count());
    }
    print_created(&id, json)
}

// ---------------------------------------------------------------------------
// Milestone handlers
// ---------------------------------------------------------------------------

fn cmd_milestone(session: &Session, cmd: MilestoneCmd, json: bool) -> CliResult {
    match cmd.action {
        MilestoneAction::Add(args) => {
            let start = args.start.as_deref().map(parse_date).transpose()?;
            let end = args.end.as_deref().map(parse_date).transpose()?;
            let id = with_editor(session, &args.track, |editor| {
                let id = editor
                    .apply(Command::AddMilestone {
                        title: args.title,
                        position: insert_position(args.top, args.after),
                    })?
                    .created_id
                    .ok_or("milestone was not created")?;
                if start.is_some() || end.is_some() {
                    editor.apply(Command::UpdateMilestone {
                        milestone_id: id.clone(),
                        patch: MilestonePatch {
                            start_date: start.map(Some),
                            end_date: end.map(Some),
                            ..Default::default()
                        },
                    })?;
                }
                Ok(id)
            })?;
            print_created(&id, json)
        }
        MilestoneAction::Edit(args) => {
            let patch = MilestonePatch {
                title: args.title,
                description: args.description,
                start_date: parse_date_patch(args.start.as_deref())?,
                end_date: parse_date_patch(args.end.as_deref())?,
            };
            with_editor(session, &args.track, |editor| {
                editor.apply(Command::UpdateMilestone {
                    milestone_id: args.id,
                    patch,
                })?;
                Ok(())
            })
        }
        MilestoneAction::Rm(args) => with_editor(session, &args.track, |editor| {
            editor.apply(Command::RemoveMilestone {
                milestone_id: args.id,
            })?;
            Ok(())
        }),
        MilestoneAction::Mv(args) => with_editor(session, &args.track, |editor| {
            let drag = reorder::milestone_drag(editor.track(), &args.id, args.position)?;
            editor.apply(Command::Drag(drag))?;
            Ok(())
        }),
    }
}

// ---------------------------------------------------------------------------
// Stage handlers
// ---------------------------------------------------------------------------

fn cmd_stage(session: &Session, cmd: StageCmd, json: bool) -> CliResult {
    match cmd.action {
        StageAction::Add(args) => {
            let kind: StageKind = args.kind.parse()?;
            let id = with_editor(session, &args.track, |editor| {
                let id = editor
                    .apply(Command::AddStage {
                        milestone_id: args.milestone,
                        kind,
                        title: args.title,
                        position: insert_position(args.top, args.after),
                    })?
                    .created_id
                    .ok_or("stage was not created")?;
                if args.coins.is_some() || args.required {
                    editor.apply(Command::UpdateStage {
                        stage_id: id.clone(),
                        patch: StagePatch {
                            coin_reward: args.coins,
                            required: args.required.then_some(true),
                            ..Default::default()
                        },
                    })?;
                }
                Ok(id)
            })?;
            print_created(&id, json)
        }
        StageAction::Edit(args) => with_editor(session, &args.track, |editor| {
            editor.apply(Command::UpdateStage {
                stage_id: args.id,
                patch: StagePatch {
                    title: args.title,
                    description: args.description,
                    required: args.required,
                    coin_reward: args.coins,
                },
            })?;
            Ok(())
        }),
        StageAction::Rm(args) => with_editor(session, &args.track, |editor| {
            editor.apply(Command::RemoveStage { stage_id: args.id })?;
            Ok(())
        }),
        StageAction::Mv(args) => with_editor(session, &args.track, |editor| {
            let track = editor.track();
            if reorder::is_sole_stage(track, &args.id) {
                return Err(format!(
                    "stage {} is the only stage of the only milestone and cannot be moved",
                    args.id
                )
                .into());
            }
            let dest = match args.to {
                Some(milestone_id) => milestone_id,
                None => {
                    let mi = track
                        .milestone_index_of_stage(&args.id)
                        .ok_or_else(|| format!("stage not found: {}", args.id))?;
                    track.milestones[mi].id.clone()
                }
            };
            let drag = reorder::stage_drag(track, &args.id, &dest, args.position)?;
            editor.apply(Command::Drag(drag))?;
            Ok(())
        }),
    }
}

// ---------------------------------------------------------------------------
// Completion handlers
// ---------------------------------------------------------------------------

fn set_completion(
    session: &Session,
    track_id: &str,
    stage_id: String,
    completed: bool,
    by: Option<String>,
    json: bool,
) -> CliResult {
    let update = with_editor(session, track_id, |editor| {
        let applied = editor.apply(Command::SetCompletion {
            stage_id,
            completed,
            by,
        })?;
        Ok(applied.progress)
    })?;
    let Some(update) = update else {
        return Ok(());
    };
    if json {
        println!("{}", serde_json::to_string_pretty(&update)?);
    } else {
        for item in &update.linked_items {
            println!("linked: {}", item);
        }
    }
    Ok(())
}

fn cmd_complete(session: &Session, args: CompleteArgs, json: bool) -> CliResult {
    let by = args.by.or_else(|| session.config.user.name.clone());
    set_completion(session, &args.track, args.stage, true, by, json)
}

fn cmd_reopen(session: &Session, args: ReopenArgs, json: bool) -> CliResult {
    set_completion(session, &args.track, args.stage, false, None, json)
}

// ---------------------------------------------------------------------------
// Checklist handlers
// ---------------------------------------------------------------------------

fn cmd_item(session: &Session, cmd: ItemCmd, json: bool) -> CliResult {
    match cmd.action {
        ItemAction::Add(args) => {
            let id = with_editor(session, &args.track, |editor| {
                let command = match args.link {
                    Some(linked_stage_id) => Command::AddLinkedItem {
                        stage_id: args.stage,
                        text: args.text,
                        linked_stage_id,
                    },
                    None => Command::AddChecklistItem {
                        stage_id: args.stage,
                        text: args.text,
                    },
                };
                Ok(editor
                    .apply(command)?
                    .created_id
                    .ok_or("checklist item was not created")?)
            })?;
            print_created(&id, json)
        }
        ItemAction::Toggle(args) => with_editor(session, &args.track, |editor| {
            editor.apply(Command::ToggleChecklistItem {
                stage_id: args.stage,
                item_id: args.item,
            })?;
            Ok(())
        }),
        ItemAction::Rm(args) => with_editor(session, &args.track, |editor| {
            editor.apply(Command::RemoveChecklistItem {
                stage_id: args.stage,
                item_id: args.item,
            })?;
            Ok(())
        }),
    }
}
