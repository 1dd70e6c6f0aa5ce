use std::path::{Path, PathBuf};
use std::process;

use bindery::build::{build_all, build_book, check_chapters, Error as BuildError};
use bindery::config::{Config, Error as ConfigError};
use bindery::target::Format;
use bindery::trailer::DiscussionPolicy;
use bindery::validate::ChapterWarning;
use clap::{App, AppSettings, Arg, ArgMatches, SubCommand};

const EXIT_SUCCESS: i32 = 0;
const EXIT_FATAL: i32 = 1;
const EXIT_WARNINGS: i32 = 2;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let project = Arg::with_name("project")
        .long("project")
        .short("p")
        .value_name("DIR")
        .help("Directory containing bindery.yaml (or a subdirectory of it)")
        .default_value(".");

    let matches = App::new("bindery")
        .about("Merges book chapters into a single manuscript")
        .version(env!("CARGO_PKG_VERSION"))
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .subcommand(
            SubCommand::with_name("build")
                .about("Builds the manuscript for one output format")
                .arg(project.clone())
                .arg(
                    Arg::with_name("format")
                        .long("format")
                        .short("f")
                        .value_name("FORMAT")
                        .possible_values(&["markdown", "pdf", "epub", "all"])
                        .default_value("pdf"),
                )
                .arg(
                    Arg::with_name("output")
                        .long("output")
                        .short("o")
                        .value_name("DIR")
                        .help("Overrides the configured output directory"),
                )
                .arg(
                    Arg::with_name("strict")
                        .long("strict")
                        .conflicts_with("lenient")
                        .help("Fails on chapters without a comments_id"),
                )
                .arg(
                    Arg::with_name("lenient")
                        .long("lenient")
                        .help("Omits the discussion block for chapters without a comments_id"),
                ),
        )
        .subcommand(
            SubCommand::with_name("check")
                .about("Validates the code fences of every chapter")
                .arg(project),
        )
        .get_matches();

    let result = match matches.subcommand() {
        ("build", Some(matches)) => build(matches),
        ("check", Some(matches)) => check(matches),
        _ => unreachable!("clap requires a subcommand"),
    };

    match &result {
        Ok(warnings) if !warnings.is_empty() => {
            eprintln!("{} warning(s):", warnings.len());
            for warning in warnings {
                eprintln!("  {}", warning);
            }
        }
        Err(err) => eprintln!("error: {}", err),
        Ok(_) => {}
    }
    process::exit(exit_code(&result));
}

// Warnings never stop a build, but they still fail the run.
fn exit_code<E>(result: &Result<Vec<ChapterWarning>, E>) -> i32 {
    match result {
        Ok(warnings) if warnings.is_empty() => EXIT_SUCCESS,
        Ok(_) => EXIT_WARNINGS,
        Err(_) => EXIT_FATAL,
    }
}

fn load_config(matches: &ArgMatches) -> Result<Config, Error> {
    let dir = Path::new(matches.value_of("project").unwrap_or("."));
    Ok(Config::from_directory(dir)?)
}

fn build(matches: &ArgMatches) -> Result<Vec<ChapterWarning>, Error> {
    let mut config = load_config(matches)?;
    if let Some(output) = matches.value_of("output") {
        config.output_directory = PathBuf::from(output);
    }

    let policy = if matches.is_present("strict") {
        Some(DiscussionPolicy::Strict)
    } else if matches.is_present("lenient") {
        Some(DiscussionPolicy::Lenient)
    } else {
        None
    };

    match matches.value_of("format").unwrap_or("pdf") {
        "all" => Ok(build_all(&config, policy)?
            .into_iter()
            .flat_map(|(_, report)| report.warnings)
            .collect()),
        name => {
            let format = name.parse::<Format>().map_err(ConfigError::from)?;
            Ok(build_book(&config, format, policy)?.warnings)
        }
    }
}

fn check(matches: &ArgMatches) -> Result<Vec<ChapterWarning>, Error> {
    let config = load_config(matches)?;
    Ok(check_chapters(&config)?)
}

#[derive(Debug)]
enum Error {
    Config(ConfigError),
    Build(BuildError),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::Config(err) => err.fmt(f),
            Error::Build(err) => err.fmt(f),
        }
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Error {
        Error::Config(err)
    }
}

impl From<BuildError> for Error {
    fn from(err: BuildError) -> Error {
        Error::Build(err)
    }
}
