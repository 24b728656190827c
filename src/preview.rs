use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};
use std::thread::JoinHandle;
use tracing::{info, warn};

use crate::config::Config;

pub fn preview_path() -> PathBuf {
    Config::get_config_dir().join("preview.html")
}

/// Full page around the element, linked to the built stylesheet.
pub fn render_document(stylesheet: &Path, element: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta http-equiv="X-UA-Compatible" content="IE=edge">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <link href="file://{stylesheet}" rel="stylesheet">
    <title>ValRender Preview</title>
</head>
<body>
    <main class="flex flex-col items-center m-4 space-y-4">
        <div class="w-full h-[calc(100vh-200px)] flex-grow flex justify-center items-center" id="output">
            {element}
        </div>
    </main>
</body>
</html>
"#,
        stylesheet = stylesheet.display(),
        element = element,
    )
}

pub fn write_and_open(stylesheet: &Path, element: &str) -> Result<PathBuf> {
    let path = preview_path();
    write_document(&path, stylesheet, element)?;
    open_in_browser(&path)?;
    Ok(path)
}

fn write_document(path: &Path, stylesheet: &Path, element: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    std::fs::write(path, render_document(stylesheet, element))
        .with_context(|| format!("writing preview {}", path.display()))
}

fn open_in_browser(path: &Path) -> Result<()> {
    let mut cmd = if cfg!(target_os = "macos") {
        Command::new("open")
    } else if cfg!(windows) {
        let mut cmd = Command::new("cmd");
        cmd.args(["/C", "start", ""]);
        cmd
    } else {
        Command::new("xdg-open")
    };

    info!(path = %path.display(), "opening preview");
    cmd.arg(path);
    spawn_detached(cmd)
        .context("Failed to open preview. Please install xdg-open or open the file manually")?;
    Ok(())
}

/// Spawns the opener and reaps it on a background thread once it exits.
fn spawn_detached(mut cmd: Command) -> std::io::Result<JoinHandle<Option<ExitStatus>>> {
    let mut child = cmd.spawn()?;
    Ok(std::thread::spawn(move || match child.wait() {
        Ok(status) => Some(status),
        Err(e) => {
            warn!("waiting for preview opener failed: {}", e);
            None
        }
    }))
}
