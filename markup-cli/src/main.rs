// Command-line front end for the markup compiler.
//
// Thin wrapper over markup-core: parses flags into an `EngineOptions`/`Input` pair, builds an
// `Engine`, and prints diagnostics to stderr. All translation logic lives in the core crate.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use markup_core::document::Doctype;
use markup_core::engine::{Engine, EngineOptions, Input};
use markup_core::MarkupError;

/// Converts lightweight-markup source to a backend output format.
#[derive(Parser, Debug)]
#[command(name = "markup", version, about, arg_required_else_help = true)]
struct Cli {
    /// Input file, or `-` for stdin.
    input: Option<String>,

    /// Backend to render for (determines which `[tags]`/template sections apply).
    #[arg(short = 'b', long = "backend", default_value = "html")]
    backend: String,

    /// Document type: article, manpage, or book.
    #[arg(short = 'd', long = "doctype", default_value = "article")]
    doctype: String,

    /// Additional configuration file to load, after the directory-search cascade. Repeatable.
    #[arg(short = 'f', long = "conf-file")]
    conf_file: Vec<PathBuf>,

    /// Set an attribute: `name`, `name=value`, or `name=value@` (don't override an existing
    /// value). Repeatable.
    #[arg(short = 'a', long = "attribute")]
    attribute: Vec<String>,

    /// Write output to this file, or `-` for stdout (default).
    #[arg(short = 'o', long = "out-file")]
    out_file: Option<String>,

    /// Suppress the document header and footer.
    #[arg(short = 's', long = "no-header-footer")]
    no_header_footer: bool,

    /// Turn on section numbering. Equivalent to `-a numbered`.
    #[arg(short = 'n', long = "section-numbers")]
    section_numbers: bool,

    /// Skip the configuration directory-search cascade. Explicit `-f` files still load.
    #[arg(short = 'e', long = "no-conf")]
    no_conf: bool,

    /// Print the merged configuration and exit, without translating.
    #[arg(short = 'c', long = "dump-conf")]
    dump_conf: bool,

    /// Raise log verbosity.
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,

    /// Disable safe mode: allow `sys:`/`sys2:`/filters and includes outside the document root.
    #[arg(long = "unsafe")]
    unsafe_mode: bool,

    /// Print help for a topic (`attributes`, `macros`, `config`) and exit.
    #[arg(long = "help-topic", value_name = "TOPIC")]
    help_topic: Option<String>,
}

/// Splits a `-a` argument into (name, value, soft) where `soft` means a trailing `@` was given.
fn parse_attribute_flag(raw: &str) -> (String, Option<String>, bool) {
    let (body, soft) = match raw.strip_suffix('@') {
        Some(stripped) => (stripped, true),
        None => (raw, false),
    };
    match body.split_once('=') {
        Some((name, value)) => (name.to_string(), Some(value.to_string()), soft),
        None => (body.to_string(), Some(String::new()), soft),
    }
}

fn print_help_topic(topic: &str) {
    match topic {
        "attributes" => println!("attributes: -a name[=value][@] sets a document attribute; a trailing @ keeps an existing value"),
        "macros" => println!("macros: see the [macros] and [blockdef-*]/[paradef-*] sections of the active configuration"),
        "config" => println!("config: -f adds a configuration file; -e skips the directory-search cascade; -c dumps the merged result"),
        other => println!("no help available for '{}'", other),
    }
}

fn run() -> Result<bool, MarkupError> {
    let cli = Cli::parse();

    let mut builder = env_logger::Builder::from_default_env();
    if cli.verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.init();

    if let Some(topic) = &cli.help_topic {
        print_help_topic(topic);
        return Ok(false);
    }

    let doctype = Doctype::parse(&cli.doctype)
        .ok_or_else(|| MarkupError::Config(format!("unknown doctype: {}", cli.doctype)))?;

    let input_path = match cli.input.as_deref() {
        Some("-") | None => None,
        Some(path) => Some(PathBuf::from(path)),
    };

    let mut options = EngineOptions::new(doctype, cli.backend.clone());
    options.conf_files = cli.conf_file.clone();
    options.no_conf = cli.no_conf;
    options.input_path = input_path.clone();
    options.no_header_footer = cli.no_header_footer;
    options.section_numbers = cli.section_numbers;
    options.unsafe_mode = cli.unsafe_mode;

    // A trailing `@` means "don't override" — resolved here since `EngineOptions.attributes`
    // has no such concept of its own; soft entries are simply dropped when a prior flag (or an
    // earlier occurrence of the same name) already claimed that name.
    let mut seen = std::collections::HashSet::new();
    for raw in &cli.attribute {
        let (name, value, soft) = parse_attribute_flag(raw);
        if soft && seen.contains(&name) {
            continue;
        }
        seen.insert(name.clone());
        options.attributes.push((name, value));
    }

    let engine = Engine::new(options)?;

    if cli.dump_conf {
        print!("{}", engine.dump_conf());
        return Ok(false);
    }

    let input = match &input_path {
        Some(path) => Input::File(path.clone()),
        None => Input::Stdin,
    };

    let mut sink: Box<dyn std::io::Write> = match cli.out_file.as_deref() {
        Some("-") | None => Box::new(std::io::stdout()),
        Some(path) => Box::new(
            std::fs::File::create(path).map_err(|e| MarkupError::Io(e.to_string()))?,
        ),
    };

    let summary = engine.translate(input, &mut *sink)?;
    for diagnostic in &summary.diagnostics {
        eprintln!("{}", diagnostic);
    }
    Ok(summary.has_errors())
}

fn main() -> ExitCode {
    match run() {
        Ok(false) => ExitCode::SUCCESS,
        Ok(true) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("markup: {}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_attribute() {
        assert_eq!(
            parse_attribute_flag("numbered"),
            ("numbered".to_string(), Some(String::new()), false)
        );
    }

    #[test]
    fn parses_named_value() {
        assert_eq!(
            parse_attribute_flag("toc=macro"),
            ("toc".to_string(), Some("macro".to_string()), false)
        );
    }

    #[test]
    fn parses_soft_set() {
        assert_eq!(
            parse_attribute_flag("toc=macro@"),
            ("toc".to_string(), Some("macro".to_string()), true)
        );
    }
}
