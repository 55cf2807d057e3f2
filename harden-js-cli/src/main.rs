use clap::builder::PossibleValuesParser;
use clap::Parser;
use harden_js::diagnostics::console::log_vm_error;
use harden_js::diagnostics::console::ConsoleSink;
use harden_js::diagnostics::console::LogLevel;
use harden_js::CompartmentOptions;
use harden_js::EvaluateOptions;
use harden_js::LockdownOptions;
use harden_js::Realm;
use harden_js::Value;
use harden_js::VmError;
use std::fs;
use std::io::stdin;
use std::io::Read;
use std::path::PathBuf;
use std::process;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
  name = "harden-js",
  about = "Lock down a realm and run a script inside a compartment"
)]
struct Cli {
  /// Script to evaluate; omit for stdin.
  #[arg(short, long)]
  input: Option<PathBuf>,

  /// JSON file of lockdown options. Flags below take precedence over it.
  #[arg(long)]
  options: Option<PathBuf>,

  /// JSON file holding an object whose properties are copied onto the compartment's global.
  #[arg(short, long)]
  endowments: Option<PathBuf>,

  /// Compartment name, used in diagnostics.
  #[arg(long, default_value = "main")]
  name: String,

  /// Let assignments to undeclared names create globals.
  #[arg(long)]
  sloppy_globals: bool,

  #[arg(long, value_parser = PossibleValuesParser::new(["safe", "unsafe"]))]
  date_taming: Option<String>,

  #[arg(long, value_parser = PossibleValuesParser::new(["safe", "unsafe"]))]
  error_taming: Option<String>,

  #[arg(long, value_parser = PossibleValuesParser::new(["safe", "unsafe"]))]
  math_taming: Option<String>,

  #[arg(long, value_parser = PossibleValuesParser::new(["safe", "unsafe"]))]
  regexp_taming: Option<String>,

  #[arg(long, value_parser = PossibleValuesParser::new(["safe", "unsafe"]))]
  locale_taming: Option<String>,

  #[arg(long, value_parser = PossibleValuesParser::new(["safe", "unsafe"]))]
  console_taming: Option<String>,

  #[arg(long, value_parser = PossibleValuesParser::new(["min", "moderate", "severe"]))]
  override_taming: Option<String>,

  #[arg(long, value_parser = PossibleValuesParser::new(["concise", "verbose"]))]
  stack_filtering: Option<String>,

  /// Log level for engine tracing, written to stderr.
  #[arg(long, default_value = "warn")]
  log_level: String,
}

/// Console output goes to stderr so stdout only carries the completion value.
struct StderrConsole;

impl ConsoleSink for StderrConsole {
  fn write(&mut self, _level: LogLevel, _method: &str, args: &[String]) {
    eprintln!("{}", args.join(" "));
  }
}

fn exit_with(message: impl std::fmt::Display) -> ! {
  eprintln!("harden-js: {message}");
  process::exit(2);
}

fn read_json(path: &PathBuf) -> serde_json::Value {
  let text = match fs::read_to_string(path) {
    Ok(text) => text,
    Err(err) => exit_with(format!("failed to read {}: {err}", path.display())),
  };
  match serde_json::from_str(&text) {
    Ok(json) => json,
    Err(err) => exit_with(format!("{} is not valid JSON: {err}", path.display())),
  }
}

fn lockdown_options(args: &Cli) -> Result<LockdownOptions, VmError> {
  let mut map = match args.options.as_ref().map(read_json) {
    Some(serde_json::Value::Object(map)) => map,
    Some(_) => exit_with("lockdown options must be a JSON object"),
    None => serde_json::Map::new(),
  };
  let flags = [
    ("dateTaming", &args.date_taming),
    ("errorTaming", &args.error_taming),
    ("mathTaming", &args.math_taming),
    ("regExpTaming", &args.regexp_taming),
    ("localeTaming", &args.locale_taming),
    ("consoleTaming", &args.console_taming),
    ("overrideTaming", &args.override_taming),
    ("stackFiltering", &args.stack_filtering),
  ];
  for (name, value) in flags {
    if let Some(value) = value {
      map.insert(name.to_string(), serde_json::Value::String(value.clone()));
    }
  }
  LockdownOptions::from_json(&serde_json::Value::Object(map).to_string())
}

fn run(args: &Cli, source: &str) -> Result<i32, VmError> {
  let mut realm = Realm::new()?;
  realm.set_console_sink(Box::new(StderrConsole));
  harden_js::lockdown(&mut realm, lockdown_options(args)?)?;

  let endowments = match args.endowments.as_ref().map(read_json) {
    Some(json @ serde_json::Value::Object(_)) => realm.value_from_json(&json)?.as_object(),
    Some(_) => exit_with("endowments must be a JSON object"),
    None => None,
  };
  let compartment =
    realm.new_compartment(endowments, CompartmentOptions::new().name(args.name.clone()))?;
  let options = EvaluateOptions::new().sloppy_globals_mode(args.sloppy_globals);
  tracing::debug!(compartment = %args.name, bytes = source.len(), "evaluating script");
  match realm.evaluate_in(compartment, source, options) {
    Ok(value) => {
      let rendered = match &value {
        Value::String(s) => s.to_string(),
        Value::Object(_) => match realm.to_json(value.clone())? {
          Some(json) => json,
          None => realm.display(&value),
        },
        other => realm.display(other),
      };
      println!("{rendered}");
      Ok(0)
    }
    Err(err) => {
      log_vm_error(&mut realm, err)?;
      Ok(1)
    }
  }
}

fn main() {
  let args = Cli::parse();
  let filter = EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("warn"));
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .init();

  let source = match args.input.as_ref() {
    Some(path) => match fs::read_to_string(path) {
      Ok(source) => source,
      Err(err) => exit_with(format!("failed to read {}: {err}", path.display())),
    },
    None => {
      let mut source = String::new();
      if let Err(err) = stdin().read_to_string(&mut source) {
        exit_with(format!("failed to read stdin: {err}"));
      }
      source
    }
  };

  match run(&args, &source) {
    Ok(code) => process::exit(code),
    Err(err) => exit_with(err),
  }
}
