use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{CommandFactory, Parser, ValueEnum};

use ainb_rs::enum_resolve::{global_enum_db, set_enum_db, EnumDb};
use ainb_rs::Ainb;

/// Simple command line utility for working with AINB files
#[derive(Clone, Debug, Parser)]
#[command(name = "ainb-tools")]
struct Args {
    /// Input file type, inferred from the input extension if not given
    #[arg(long = "in_type", short = 'i', value_enum)]
    in_type: Option<FileType>,
    /// Output file type, the opposite of the input type if not given
    #[arg(long = "out_type", short = 'o', value_enum)]
    out_type: Option<FileType>,
    /// Directory to output the converted file into
    #[arg(long = "output_path")]
    output_path: Option<PathBuf>,
    /// Game the AINB file comes from/is for (nss = Nintendo Switch
    /// Sports, s3 = Splatoon 3, totk = The Legend of Zelda: Tears of the
    /// Kingdom, smw = Super Mario Bros. Wonder); selects the enum database
    #[arg(long, short, value_enum, default_value = "totk")]
    game: Game,
    /// Explicit enum database file, overrides the one selected by --game
    #[arg(long = "enum_db")]
    enum_db: Option<PathBuf>,
    /// Input file path (either a JSON or AINB file)
    input_file_path: Option<PathBuf>,
}

/// File type to read or emit
#[derive(Clone, Copy, Debug, PartialEq, ValueEnum)]
enum FileType {
    Ainb,
    Json,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Game {
    Nss,
    S3,
    Totk,
    Smw,
    Other,
}

impl Game {
    fn db_filename(self) -> &'static str {
        match self {
            Game::Nss => "nss.json",
            Game::S3 => "s3.json",
            Game::Totk => "totk.json",
            Game::Smw => "smw.json",
            Game::Other => "other.json",
        }
    }
}

impl Args {
    fn input_type(&self, input: &Path) -> FileType {
        if let Some(input_type) = self.in_type {
            return input_type;
        }
        match input.extension().and_then(std::ffi::OsStr::to_str) {
            Some("json") => FileType::Json,
            _ => FileType::Ainb,
        }
    }
}

/// Installs the enum database selected by the arguments. A missing
/// database file is tolerated, matching games that ship without one.
fn load_enum_db(args: &Args) -> Result<()> {
    let path = match &args.enum_db {
        Some(path) => path.clone(),
        None => Path::new("data").join(args.game.db_filename()),
    };
    if !path.exists() {
        return Ok(());
    }
    let text = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let db = EnumDb::from_json_text(&text)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    set_enum_db(db);
    Ok(())
}

fn output_file(args: &Args, filename: &str, ext: &str) -> Result<PathBuf> {
    let dir = match &args.output_path {
        Some(dir) => {
            fs::create_dir_all(dir)?;
            dir.clone()
        }
        None => PathBuf::new(),
    };
    Ok(dir.join(format!("{filename}.{ext}")))
}

fn main() -> Result<()> {
    let args = Args::parse();

    let Some(input) = args.input_file_path.clone() else {
        Args::command().print_help()?;
        return Ok(());
    };
    if !input.exists() {
        bail!("{} does not exist", input.display());
    }

    load_enum_db(&args)?;
    let empty_db = EnumDb::default();
    let enum_db = global_enum_db().unwrap_or(&empty_db);

    let in_type = args.input_type(&input);
    let out_type = args.out_type.unwrap_or(match in_type {
        FileType::Ainb => FileType::Json,
        FileType::Json => FileType::Ainb,
    });

    let ainb = match in_type {
        FileType::Ainb => Ainb::from_binary(fs::read(&input)?, enum_db)?,
        FileType::Json => Ainb::from_json_text(&fs::read_to_string(&input)?)?,
    };

    match out_type {
        FileType::Json => {
            let path = output_file(&args, &ainb.filename, "json")?;
            fs::write(path, ainb.to_json())?;
        }
        FileType::Ainb => {
            let path = output_file(&args, &ainb.filename, "ainb")?;
            fs::write(path, ainb.to_binary()?)?;
        }
    }
    Ok(())
}
