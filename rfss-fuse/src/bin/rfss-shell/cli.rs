use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(version, about = "Inspect and modify RFSS disk images")]
pub struct Cli {
    /// Disk image file
    #[arg(long, short, default_value = "fs.img")]
    pub image: PathBuf,

    /// Run each mutating command inside a journal transaction.
    /// A transaction changes at most 7 blocks, 3 of which go to metadata,
    /// so put/write are limited to two data blocks (8 KiB).
    #[arg(long, short)]
    pub journal: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create the image file and format it
    Format {
        /// Image size in MiB
        #[arg(long, short, default_value_t = 16)]
        size: u64,

        /// Volume label, at most 15 bytes
        #[arg(long, short)]
        label: Option<String>,

        /// Reserve a journal region
        #[arg(long)]
        with_journal: bool,
    },

    /// Read commands from standard input
    Shell,

    #[command(flatten)]
    Op(Op),
}

/// 挂载后可执行的操作，命令行与交互模式共用
#[derive(Subcommand)]
pub enum Op {
    /// Show volume statistics
    Info,
    /// List a directory
    Ls {
        #[arg(default_value = ".")]
        path: String,
    },
    /// Change the current directory
    Cd { path: String },
    /// Print the current directory
    Pwd,
    Mkdir { path: String },
    Rmdir { path: String },
    /// Create an empty file
    Touch {
        path: String,

        /// Permission bits, octal
        #[arg(long, short, default_value = "644", value_parser = parse_mode)]
        mode: u32,
    },
    Rm { path: String },
    /// Print a file
    Cat { path: String },
    /// Copy a host file into the image
    Put { host: PathBuf, path: String },
    /// Copy a file out of the image
    Get { path: String, host: PathBuf },
    /// Replace a file's contents with text
    Write {
        path: String,
        #[arg(required = true)]
        text: Vec<String>,
    },
    Stat { path: String },
    /// Check the filesystem
    Fsck,
    /// Journal control
    Journal {
        #[command(subcommand)]
        action: JournalAction,
    },
}

#[derive(Subcommand, Clone, Copy)]
pub enum JournalAction {
    On,
    Off,
    Status,
    /// Start a transaction
    Begin,
    Commit,
    Abort,
}

/// 交互模式下的一行
#[derive(Parser)]
#[command(no_binary_name = true, disable_help_flag = true, disable_version_flag = true)]
pub struct Line {
    #[command(subcommand)]
    pub op: Op,
}

fn parse_mode(s: &str) -> Result<u32, String> {
    u32::from_str_radix(s, 8)
        .ok()
        .filter(|&mode| mode <= 0o7777)
        .ok_or_else(|| format!("invalid mode {s:?}"))
}

impl Op {
    /// 会修改文件系统的操作
    pub fn mutates(&self) -> bool {
        matches!(
            self,
            Op::Mkdir { .. }
                | Op::Rmdir { .. }
                | Op::Touch { .. }
                | Op::Rm { .. }
                | Op::Put { .. }
                | Op::Write { .. }
        )
    }
}
