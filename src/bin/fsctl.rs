//! Command-line front end for the filesystem simulator: mounts an image file
//! (creating and formatting it if absent) and runs a single operation
//! against it.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use fatsim::{FileInfo, Filesystem, Geometry, MmapBlockDevice};

#[derive(Parser)]
#[command(name = "fsctl", about = "Inspect and edit a fatsim image file")]
struct Cli {
    /// Path to the image file; created and formatted if it does not exist.
    #[arg(long, default_value = "fatsim.img")]
    image: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Creates a directory entry.
    Mkdir { path: String },
    /// Writes stdin (or `--text`) to a file, creating it if needed.
    Put {
        path: String,
        #[arg(long)]
        text: Option<String>,
    },
    /// Prints a file's contents to stdout.
    Cat { path: String },
    /// Removes a file or empty directory entry.
    Rm { path: String },
    /// Lists the entries directly inside a directory (default: root).
    Ls {
        #[arg(default_value = "/")]
        path: String,
    },
    /// Prints one entry's metadata.
    Stat { path: String },
    /// Prints filesystem-wide geometry, usage, and cache statistics.
    Info,
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("fsctl: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> fatsim::FsResult<()> {
    let is_new = !cli.image.exists();
    let geometry = Geometry::from_env();
    let device = MmapBlockDevice::open(&cli.image, geometry)?;
    let fs = Filesystem::new(device, geometry.buffer_capacity);
    if is_new {
        fs.format()?;
    }

    match cli.command {
        Command::Mkdir { path } => fs.create_directory(&path)?,
        Command::Put { path, text } => {
            let data = match text {
                Some(text) => text.into_bytes(),
                None => {
                    use std::io::Read;
                    let mut buf = Vec::new();
                    std::io::stdin().read_to_end(&mut buf).ok();
                    buf
                }
            };
            if fs.get_file_info(&path).is_ok() {
                fs.write_file(&path, &data)?;
            } else {
                fs.create_file(&path, &data)?;
            }
        }
        Command::Cat { path } => {
            let data = fs.read_file(&path)?;
            use std::io::Write;
            std::io::stdout().write_all(&data).ok();
        }
        Command::Rm { path } => fs.delete_file(&path)?,
        Command::Ls { path } => {
            for entry in fs.list_directory(&path)? {
                print_entry(&entry);
            }
        }
        Command::Stat { path } => print_entry(&fs.get_file_info(&path)?),
        Command::Info => {
            let info = fs.get_system_info()?;
            println!("block_size        = {}", info.geometry.block_size);
            println!("total_blocks      = {}", info.geometry.total_blocks);
            println!("free_blocks       = {}", info.free_blocks);
            println!("used_blocks       = {}", info.used_blocks);
            println!("root_entries      = {}", info.root_entries);
            println!(
                "buffer occupancy  = {}/{}",
                info.buffer.occupancy, info.buffer.capacity
            );
            println!("buffer hit ratio  = {:.2}", info.buffer.stats.hit_ratio());
        }
    }

    fs.shutdown()?;
    Ok(())
}

fn print_entry(info: &FileInfo) {
    let kind = if info.is_directory { "dir " } else { "file" };
    let lock = if info.locked { "locked" } else { "" };
    println!("{kind}  {:>10}  {:<32} {}", info.size, info.name, lock);
}
