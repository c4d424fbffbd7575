use std::path::Path;
use std::process::Command;

use anyhow::{Context, Result};
use image::GrayImage;
use log::{debug, info};

/// Something that can put a rendered symbol in front of the user.
pub trait Viewer {
    fn show(&self, image: &GrayImage) -> Result<()>;
}

/// Hands the image to the platform's default image viewer.
///
/// The image goes to a temporary PNG that outlives the process, since the
/// viewer runs detached and may open it after we exit.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemViewer;

impl Viewer for SystemViewer {
    fn show(&self, image: &GrayImage) -> Result<()> {
        let file = tempfile::Builder::new()
            .prefix("qrgen-")
            .suffix(".png")
            .tempfile()
            .context("failed to create a temporary image file")?;

        let (_, path) = file
            .keep()
            .context("failed to keep the temporary image file")?;

        image
            .save(&path)
            .with_context(|| format!("failed to write {}", path.display()))?;

        debug!("wrote preview image to {}", path.display());

        open_command(&path)
            .spawn()
            .context("failed to launch the image viewer")?;

        info!("opened {} in the image viewer", path.display());

        Ok(())
    }
}

#[cfg(target_os = "macos")]
fn open_command(path: &Path) -> Command {
    let mut command = Command::new("open");
    command.arg(path);
    command
}

#[cfg(target_os = "windows")]
fn open_command(path: &Path) -> Command {
    let mut command = Command::new("cmd");
    command.args(&["/C", "start", ""]).arg(path);
    command
}

#[cfg(not(any(target_os = "macos", target_os = "windows")))]
fn open_command(path: &Path) -> Command {
    let mut command = Command::new("xdg-open");
    command.arg(path);
    command
}

#[test]
fn open_command_test() {
    let command = open_command(Path::new("/tmp/qrgen-preview.png"));
    let args: Vec<_> = command.get_args().collect();

    assert_eq!(Some(&std::ffi::OsStr::new("/tmp/qrgen-preview.png")), args.last());
}
