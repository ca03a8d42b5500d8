use std::{env, io, path::PathBuf};

use anyhow::{Context, Result};

const APPLICATION_DIR: &str = "tempolog";

pub fn create_application_default_path() -> Result<PathBuf> {
    let path = {
        #[cfg(windows)]
        {
            let mut path = PathBuf::from(
                env::var("APPDATA").context("APPDATA should be present on Windows")?,
            );
            path.push(APPLICATION_DIR);
            path
        }
        #[cfg(target_os = "linux")]
        {
            let mut path = env::var("XDG_STATE_HOME")
                .map(PathBuf::from)
                .or_else(|_| {
                    env::var("HOME").map(|home| {
                        let mut path = PathBuf::from(home);
                        path.push(".local/state");
                        path
                    })
                })
                .context("Couldn't find neither XDG_STATE_HOME nor HOME")?;
            path.push(APPLICATION_DIR);
            path
        }
        #[cfg(not(any(windows, target_os = "linux")))]
        {
            let mut path = PathBuf::from(env::var("HOME").context("Couldn't find HOME")?);
            path.push(format!(".{APPLICATION_DIR}"));
            path
        }
    };

    match std::fs::create_dir_all(&path) {
        Ok(_) => Ok(path),
        Err(v) if v.kind() == io::ErrorKind::AlreadyExists => Ok(path),
        Err(v) => Err(v.into()),
    }
}
