use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "video-wallpaper", version, about = "Plays a video behind the desktop icons")]
pub struct Cli {
    /// Video to play right away
    pub video: Option<PathBuf>,

    /// Play the video once instead of looping
    #[arg(long)]
    pub no_loop: bool,

    /// Same as VIDEO; used by generated launcher scripts
    #[arg(long, value_name = "VIDEO", conflicts_with = "video")]
    pub gui_with_video: Option<PathBuf>,

    /// Start with the video and loop flag saved in the settings
    #[arg(long, conflicts_with_all = ["video", "gui_with_video"])]
    pub autostart: bool,

    /// Register TARGET to run at logon, then exit
    #[arg(long, value_name = "TARGET", group = "maintenance")]
    pub set_autostart: Option<PathBuf>,

    /// Remove the logon entry, then exit
    #[arg(long, group = "maintenance")]
    pub unset_autostart: bool,

    /// Write a launcher script for the saved video, then exit
    #[arg(long, value_name = "SCRIPT", group = "maintenance")]
    pub create_launcher: Option<PathBuf>,

    /// Close the running instance, then exit
    #[arg(long, group = "maintenance", conflicts_with_all = ["video", "gui_with_video", "autostart"])]
    pub quit: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Launch {
    Idle,
    Video { path: PathBuf, looping: bool },
    FromSettings,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Maintenance {
    SetAutostart(PathBuf),
    UnsetAutostart,
    CreateLauncher(PathBuf),
    Quit,
}

impl Cli {
    pub fn launch(&self) -> Launch {
        if self.autostart {
            return Launch::FromSettings;
        }
        match self.gui_with_video.as_ref().or(self.video.as_ref()) {
            Some(path) => Launch::Video {
                path: path.clone(),
                looping: !self.no_loop,
            },
            None => Launch::Idle,
        }
    }

    pub fn maintenance(&self) -> Option<Maintenance> {
        if let Some(target) = &self.set_autostart {
            return Some(Maintenance::SetAutostart(target.clone()));
        }
        if self.unset_autostart {
            return Some(Maintenance::UnsetAutostart);
        }
        if self.quit {
            return Some(Maintenance::Quit);
        }
        self.create_launcher.clone().map(Maintenance::CreateLauncher)
    }
}
