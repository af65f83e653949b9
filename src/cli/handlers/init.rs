use std::path::PathBuf;

use crate::io::config_io::{self, STORE_DIR};
use crate::io::file_api::FileApi;

pub fn cmd_init(dir: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    let root = match dir {
        Some(dir) => PathBuf::from(dir),
        None => std::env::current_dir()?,
    };

    if root.join(STORE_DIR).is_dir() {
        return Err(format!("adapt store already exists in {}", root.display()).into());
    }

    // A store further up would otherwise have been picked by discovery
    if let Some(parent) = root.parent()
        && let Ok(outer) = config_io::discover_store(parent)
    {
        eprintln!("Note: enclosing store found at {}", outer.display());
        eprintln!("Creating new store in {}", root.join(STORE_DIR).display());
    }

    let store_dir = FileApi::init(&root)?;
    println!("initialized {}", store_dir.display());
    Ok(())
}
