mod cli;

use std::error::Error;
use std::fs::{self, OpenOptions};
use std::io::{self, BufRead, Write};
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use block_dev::BlockDevice;
use clap::Parser;
use rfss::{FileType, FormatOptions, JournalStatus, OpenFlag, Session};
use rfss_fuse::BlockFile;
use typed_bytesize::ByteSizeIec;

use self::cli::{Cli, Command, JournalAction, Line, Op};

type AnyResult<T = ()> = Result<T, Box<dyn Error>>;

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("rfss-shell: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> AnyResult {
    match cli.command {
        Command::Format {
            size,
            label,
            with_journal,
        } => format(&cli.image, size, label.as_deref(), with_journal),
        Command::Shell => {
            let mut fs = mount(&cli.image, cli.journal)?;
            shell(&mut fs)?;
            Ok(fs.unmount()?)
        }
        Command::Op(op) => {
            let mut fs = mount(&cli.image, cli.journal)?;
            if cli.journal && op.mutates() {
                exec_atomically(&mut fs, &op)?;
            } else {
                exec(&mut fs, &op)?;
            }
            Ok(fs.unmount()?)
        }
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn format(image: &Path, size_mib: u64, label: Option<&str>, journal: bool) -> AnyResult {
    let disk_size = ByteSizeIec::mib(size_mib).0;
    let fd = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .open(image)?;
    fd.set_len(disk_size)?;

    let dev: Arc<dyn BlockDevice> = Arc::new(BlockFile::new(fd)?);
    let mut options = FormatOptions::default().journal(journal).clock(unix_now);
    if let Some(label) = label {
        options = options.label(label);
    }
    Session::format_with(dev, &options)?;

    log::info!("formatted {} ({size_mib} MiB)", image.display());
    Ok(())
}

fn mount(image: &Path, journal: bool) -> AnyResult<Session> {
    let fd = OpenOptions::new().read(true).write(true).open(image)?;
    let mut fs = Session::mount(Arc::new(BlockFile::new(fd)?))?;
    fs.set_clock(unix_now);
    if journal {
        fs.enable_journaling()?;
    }
    Ok(fs)
}

fn shell(fs: &mut Session) -> AnyResult {
    let stdin = io::stdin();
    let mut line = String::new();

    loop {
        print!("rfss:{}> ", fs.current_path());
        io::stdout().flush()?;

        line.clear();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let words: Vec<&str> = line.split_whitespace().collect();
        match words.as_slice() {
            [] => continue,
            ["exit" | "quit"] => break,
            _ => (),
        }

        match Line::try_parse_from(words.iter().copied()) {
            Ok(Line { op }) => {
                if let Err(err) = exec(fs, &op) {
                    println!("error: {err}");
                }
            }
            Err(err) => {
                let _ = err.print();
            }
        }
    }

    if fs.in_transaction() {
        log::warn!("leaving the shell with an open transaction");
    }
    Ok(())
}

/// 在一个事务中执行会修改文件系统的操作，出错或写入不完整时整体撤销
fn exec_atomically(fs: &mut Session, op: &Op) -> AnyResult {
    let data = match op {
        Op::Put { host, .. } => fs::read(host)?,
        Op::Write { text, .. } => text.join(" ").into_bytes(),
        _ => Vec::new(),
    };

    let mut written = None;
    let result = fs.atomically(|fs| match op {
        Op::Put { path, .. } | Op::Write { path, .. } => {
            let n = write_file(fs, path, &data)?;
            if n < data.len() {
                written = Some(n);
                return Err(rfss::Error::NoSpace);
            }
            Ok(())
        }
        op => mutate(fs, op),
    });

    match (result, written) {
        (Ok(()), _) => Ok(()),
        (Err(_), Some(n)) => Err(format!(
            "short write: {n} of {} bytes, transaction aborted \
             (out of space, or more than {} blocks changed in one transaction)",
            data.len(),
            fs.journal_capacity()
        )
        .into()),
        (Err(err), None) => Err(err.into()),
    }
}

fn kind_char(kind: Option<FileType>) -> char {
    match kind {
        Some(FileType::Regular) => '-',
        Some(FileType::Directory) => 'd',
        Some(FileType::Symlink) => 'l',
        Some(FileType::Device) => 'c',
        None => '?',
    }
}

fn read_file(fs: &mut Session, path: &str) -> AnyResult<Vec<u8>> {
    let mut file = fs.open(path, OpenFlag::plain())?;
    let mut data = vec![0; file.size() as usize];
    let mut done = 0;
    while done < data.len() {
        match file.read(fs, &mut data[done..])? {
            0 => break,
            n => done += n,
        }
    }
    data.truncate(done);
    Ok(data)
}

fn write_file(fs: &mut Session, path: &str, data: &[u8]) -> rfss::Result<usize> {
    let mut file = fs.open(path, OpenFlag::CREATE | OpenFlag::TRUNC)?;
    file.write(fs, data)
}

fn write_whole(fs: &mut Session, path: &str, data: &[u8]) -> AnyResult {
    let written = write_file(fs, path, data)?;
    if written < data.len() {
        let mut msg = format!("short write: {written} of {} bytes", data.len());
        if fs.in_transaction() {
            msg += &format!(", a transaction holds at most {} blocks", fs.journal_capacity());
        }
        return Err(msg.into());
    }
    Ok(())
}

/// 只涉及文件系统本身的修改操作
fn mutate(fs: &mut Session, op: &Op) -> rfss::Result<()> {
    match op {
        Op::Mkdir { path } => fs.create_directory(path).map(drop),
        Op::Rmdir { path } => fs.remove_directory(path),
        Op::Touch { path, mode } => match fs.resolve(path)? {
            Some(_) => Ok(()),
            None => fs.create_file(path, *mode).map(drop),
        },
        Op::Rm { path } => fs.delete_file(path),
        _ => Ok(()),
    }
}

fn exec(fs: &mut Session, op: &Op) -> AnyResult {
    match op {
        Op::Info => {
            let stats = fs.stats();
            println!("label:        {}", stats.label);
            println!("block size:   {}", stats.block_size);
            println!("blocks:       {} free of {}", stats.free_blocks, stats.total_blocks);
            println!("inodes:       {} free of {}", stats.free_inodes, stats.inode_count);
            println!("journal:      {} blocks", stats.journal_blocks);
            println!("mount count:  {}", stats.mount_count);
        }
        Op::Ls { path } => {
            for entry in fs.list_directory(path)? {
                let size = fs.get_inode(entry.inode).map(|inode| inode.size).unwrap_or(0);
                println!("{} {:>5} {:>8} {}", kind_char(entry.kind), entry.inode, size, entry.name);
            }
        }
        Op::Cd { path } => fs.change_directory(path)?,
        Op::Pwd => println!("{}", fs.current_path()),
        Op::Mkdir { .. } | Op::Rmdir { .. } | Op::Touch { .. } | Op::Rm { .. } => mutate(fs, op)?,
        Op::Cat { path } => {
            let data = read_file(fs, path)?;
            io::stdout().write_all(&data)?;
        }
        Op::Put { host, path } => {
            let data = fs::read(host)?;
            write_whole(fs, path, &data)?;
        }
        Op::Get { path, host } => {
            let data = read_file(fs, path)?;
            fs::write(host, data)?;
        }
        Op::Write { path, text } => write_whole(fs, path, text.join(" ").as_bytes())?,
        Op::Stat { path } => {
            let stat = fs.stat(path)?;
            println!("inode:  {}", stat.inode);
            println!("type:   {:?}", stat.kind);
            println!("mode:   {:o}", stat.mode);
            println!("size:   {}", stat.size);
            println!("blocks: {}", stat.blocks);
            println!("links:  {}", stat.links);
            println!("mtime:  {}", stat.mtime);
        }
        Op::Fsck => {
            let problems = fs.check()?;
            if problems.is_empty() {
                println!("clean");
            }
            for problem in problems {
                println!("{problem}");
            }
        }
        Op::Journal { action } => match action {
            JournalAction::On => fs.enable_journaling()?,
            JournalAction::Off => fs.disable_journaling()?,
            JournalAction::Status => {
                let status = match fs.check_consistency()? {
                    JournalStatus::Clean => "clean".to_owned(),
                    JournalStatus::Pending { id, blocks } => {
                        format!("transaction {id} pending ({blocks} blocks)")
                    }
                    JournalStatus::Committed { id, blocks } => {
                        format!("transaction {id} committed ({blocks} blocks)")
                    }
                };
                println!(
                    "journaling {}, {} blocks per transaction, {status}",
                    if fs.journaling() { "on" } else { "off" },
                    fs.journal_capacity()
                );
            }
            JournalAction::Begin => println!("transaction {}", fs.start_transaction()?),
            JournalAction::Commit => println!("transaction {} committed", fs.commit_transaction()?),
            JournalAction::Abort => fs.abort_transaction()?,
        },
    }
    Ok(())
}
