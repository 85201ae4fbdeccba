use std::env;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::{bail, Context, Result};
use chrono::{Datelike, Local, TimeZone, Timelike};
use structopt::StructOpt;

use dumptar_format::archive::{
    DumpDate, DumpKind, DumpScanner, DumpWriter, FileLabel, VolumeHeader,
};
use dumptar_format::{
    ImageStyle, ItsName, PhysicalFormat, TapeOpen, TapeSession, ZcatDecompressor,
};

use structopt::clap::AppSettings::*;

static ZCAT: ZcatDecompressor = ZcatDecompressor;

#[derive(Debug, StructOpt)]
enum Commands {
    #[structopt(name = "c", visible_alias = "create", about = "Create a new tape")]
    Create {
        #[structopt(long, default_value = "1", help = "DUMP tape number")]
        tape_number: u32,

        #[structopt(long, default_value = "0", help = "Reel number")]
        reel: u32,
    },

    #[structopt(
        name = "r",
        visible_alias = "append",
        about = "Append files to an existing tape"
    )]
    Append,

    #[structopt(name = "t", visible_alias = "list", about = "Type out tape contents")]
    List,

    #[structopt(
        name = "x",
        visible_alias = "extract",
        about = "Extract files from a tape"
    )]
    Extract,
}

#[derive(Debug, StructOpt)]
#[structopt(
    name = "dumptar",
    about = "Access ITS DUMP tapes.",
    settings = &[SubcommandRequiredElseHelp, DisableHelpSubcommand, VersionlessSubcommands],
    usage = "dumptar (c|r|t|x) [FLAGS|OPTIONS] [files]..."
)]
struct CliOpts {
    #[structopt(
        short = "f",
        long = "file",
        global = true,
        help = "Tape drive (/dev/xxx), image file, `-` for stdin/stdout, \
                host:device for rmt, or host:port for a tape server \
                [default: $TAPE]"
    )]
    tape: Option<String>,

    #[structopt(long, global = true, help = "Read and write 7-track tape frames")]
    seven_track: bool,

    #[structopt(
        long,
        global = true,
        help = "Use E11-style tape images without record padding"
    )]
    e11: bool,

    #[structopt(
        long,
        global = true,
        default_value = "1600",
        parse(try_from_str = parse_density),
        help = "Tape density in bits per inch"
    )]
    density: u64,

    #[structopt(short, long, global = true, help = "Display names of all files accessed")]
    verbose: bool,

    #[structopt(subcommand)]
    cmd: Commands,

    #[structopt(
        name = "files",
        parse(from_os_str),
        global = true,
        help = "Files and directories to add to the tape"
    )]
    selected_files: Vec<PathBuf>,
}

impl CliOpts {
    fn open_tape(&self, create: bool, writable: bool) -> Result<TapeSession> {
        let style = if self.e11 {
            ImageStyle::E11
        } else {
            ImageStyle::Simh
        };
        let session = TapeOpen::new()
            .create(create)
            .writable(writable)
            .style(style)
            .density(self.density)
            .decompressor(&ZCAT)
            .open(self.tape.as_deref())?;
        Ok(session)
    }

    fn format(&self) -> PhysicalFormat {
        if self.seven_track {
            PhysicalFormat::SevenTrack
        } else {
            PhysicalFormat::CoreDump
        }
    }
}

/// The usage estimate divides by the density, so zero is not a density.
fn parse_density(s: &str) -> std::result::Result<u64, String> {
    match s.parse::<u64>() {
        Ok(0) => Err("density must be nonzero".to_string()),
        Ok(n) => Ok(n),
        Err(e) => Err(e.to_string()),
    }
}

/// Today's date in the SIXBIT `YYMMDD` form volume headers carry.
fn today_sixbit() -> String {
    Local::now().format("%y%m%d").to_string()
}

fn dump_date(time: Option<SystemTime>) -> Option<DumpDate> {
    let dt: chrono::DateTime<Local> = time?.into();
    Some(DumpDate {
        year: (dt.year() - 1900) as u32,
        month: dt.month(),
        day: dt.day(),
        hour: dt.hour(),
        minute: dt.minute(),
        second: dt.second(),
    })
}

fn system_time(date: DumpDate) -> Option<SystemTime> {
    Local
        .with_ymd_and_hms(
            1900 + date.year as i32,
            date.month,
            date.day,
            date.hour,
            date.minute,
            date.second,
        )
        .earliest()
        .map(SystemTime::from)
}

fn add_path(writer: &mut DumpWriter, path: &Path, verbose: bool) -> Result<()> {
    let meta = fs::symlink_metadata(path)
        .with_context(|| format!("cannot access {}", path.display()))?;

    if meta.is_dir() {
        for entry in fs::read_dir(path)
            .with_context(|| format!("cannot open directory {}", path.display()))?
        {
            let entry = entry?;
            // Skip hidden files along with `.` and `..`.
            if entry.file_name().to_string_lossy().starts_with('.') {
                continue;
            }
            add_path(writer, &entry.path(), verbose)?;
        }
        return Ok(());
    }

    let name = ItsName::from_unix(path);
    if verbose {
        print!("{} => {} ", path.display(), name);
    }

    let label = FileLabel {
        name,
        is_link: meta.file_type().is_symlink(),
        creation: dump_date(meta.modified().ok()),
        reference: dump_date(meta.accessed().ok()),
    };

    if label.is_link {
        let target = fs::read_link(path)?;
        writer.append_link(&label, &ItsName::from_unix(&target))?;
    } else {
        let mut file =
            File::open(path).with_context(|| format!("cannot open {}", path.display()))?;
        writer.append_file(&label, &mut file)?;
    }

    if verbose {
        println!("[OK]");
    }
    Ok(())
}

fn add_files(mut writer: DumpWriter, files: &[PathBuf], opts: &CliOpts) -> Result<()> {
    for path in files {
        add_path(&mut writer, path, opts.verbose)?;
    }
    let session = writer.finish()?;
    let count = session.frame_count();
    let bpi = session.density();
    session.close()?;
    tracing::debug!(frames = count, bpi, "tape written");
    if opts.verbose {
        println!(
            "Approximately {}.{}' of tape used",
            count / bpi / 12,
            (count * 10 / bpi / 12) % 10
        );
    }
    Ok(())
}

fn create(opts: &CliOpts, tape_number: u32, reel: u32) -> Result<()> {
    let session = opts.open_tape(true, true)?;
    let header = VolumeHeader {
        tape: tape_number,
        reel,
        created: today_sixbit(),
        kind: DumpKind::Random,
    };
    if opts.verbose {
        println!("Tape {}, reel {}", header.tape, header.reel);
    }
    let writer = DumpWriter::create(session, opts.format(), &header)?;
    add_files(writer, &opts.selected_files, opts)
}

fn append(opts: &CliOpts) -> Result<()> {
    let session = opts.open_tape(false, true)?;
    let writer = DumpWriter::append(session, opts.format())?;
    add_files(writer, &opts.selected_files, opts)
}

fn describe_header(scanner: &DumpScanner) {
    let h = scanner.header();
    let c = &h.created;
    if c.len() == 6 {
        println!(
            "Tape {}, reel {}, created {}/{}/{}, type={}",
            h.tape,
            h.reel,
            &c[2..4],
            &c[4..6],
            &c[0..2],
            h.kind
        );
    } else {
        println!("Tape {}, reel {}, type={}", h.tape, h.reel, h.kind);
    }
}

fn list(opts: &CliOpts) -> Result<()> {
    if !opts.selected_files.is_empty() {
        bail!("the t command takes no file arguments");
    }
    let session = opts.open_tape(false, false)?;
    let mut scanner = DumpScanner::open(session, opts.format())?;
    describe_header(&scanner);
    while let Some(label) = scanner.next_entry()? {
        println!("{}", label.name);
    }
    Ok(())
}

fn extract(opts: &CliOpts) -> Result<()> {
    if !opts.selected_files.is_empty() {
        bail!("the x command takes no file arguments");
    }
    let session = opts.open_tape(false, false)?;
    let mut scanner = DumpScanner::open(session, opts.format())?;

    while let Some(label) = scanner.next_entry()? {
        if opts.verbose {
            print!("{} ", label.name);
        }
        let out_path = label.name.to_unix();
        if opts.verbose {
            print!("=> {} ", out_path.display());
        }
        if let Some(dir) = out_path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("cannot create directory {}", dir.display()))?;
        }

        if label.is_link {
            let target = scanner.read_link()?;
            // Dates cannot be applied since the target may not exist.
            std::os::unix::fs::symlink(target.to_unix(), &out_path)
                .with_context(|| format!("cannot create link {}", out_path.display()))?;
        } else {
            let mut out = File::create(&out_path)
                .with_context(|| format!("cannot create {}", out_path.display()))?;
            scanner.extract_to(&mut out)?;
            apply_dates(&out, &label)?;
        }

        if opts.verbose {
            println!("[OK]");
        }
    }
    Ok(())
}

/// Apply the tape's creation and reference dates as the extracted file's
/// modification and access times, when known.
fn apply_dates(file: &File, label: &FileLabel) -> Result<()> {
    let modified = match label.creation.and_then(system_time) {
        Some(t) => t,
        None => return Ok(()),
    };
    let accessed = label
        .reference
        .and_then(system_time)
        .unwrap_or(modified);
    let times = fs::FileTimes::new()
        .set_modified(modified)
        .set_accessed(accessed);
    file.set_times(times).context("cannot set file dates")?;
    Ok(())
}

fn main() {
    let opts = CliOpts::from_args();

    // ITS dates are all Cambridge, MA.
    env::set_var("TZ", "EST5EDT");

    tracing_subscriber::fmt::init();

    let result = match opts.cmd {
        Commands::Create { tape_number, reel } => create(&opts, tape_number, reel),
        Commands::Append => append(&opts),
        Commands::List => list(&opts),
        Commands::Extract => extract(&opts),
    };

    if let Err(e) = result {
        eprintln!("{:?}", e);
        std::process::exit(1);
    }
}
