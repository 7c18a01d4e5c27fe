use anyhow::{bail, Context, Result};
use chrono::Local;
use tracing_subscriber::EnvFilter;

use transport_board::board::{parse_date, Direction, Scope};
use transport_board::codec::{export_csv, export_file_name, import_csv, Schema};
use transport_board::display::print_board;
use transport_board::{web, AssignmentStore, Settings};

const USAGE: &str = "usage:
  transport-board web [port]
  transport-board show [date] [go|back]
  transport-board export [date] [go|back] [--compact] [--out FILE]
  transport-board import FILE [date] [go|back]";

/// Date and direction arguments, in either order; missing parts use the selection
fn scope_args(store: &AssignmentStore, args: &[String]) -> Result<Scope> {
    let selection = store.selection();
    let mut date = selection.date;
    let mut direction = selection.direction;
    for arg in args {
        if let Some(d) = Direction::from_label(arg) {
            direction = d;
        } else if let Some(d) = parse_date(arg) {
            date = d;
        } else {
            bail!("unrecognized argument `{}`\n{}", arg, USAGE);
        }
    }
    Ok(store.scope(date, direction))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let settings = Settings::from_env();
    let file = settings.state_file();
    let mut store = file.load_store(Local::now().date_naive());

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = args.first().map(String::as_str).unwrap_or("show");
    let rest = args.get(1..).unwrap_or(&[]);

    match command {
        "web" => {
            let mut settings = settings;
            if let Some(port) = rest.first() {
                settings.port = port.parse().with_context(|| format!("invalid port `{}`", port))?;
            }
            println!("Starting web server on port {}...", settings.port);
            println!("Board state: {}", file.path().display());
            println!("Access the API at http://localhost:{}/api/board", settings.port);
            web::start_server(settings, store).await?;
        }
        "show" => {
            let scope = scope_args(&store, rest)?;
            print_board(&store, scope);
        }
        "export" => {
            let mut schema = Schema::Full;
            let mut out = None;
            let mut scope_parts = Vec::new();
            let mut iter = rest.iter();
            while let Some(arg) = iter.next() {
                match arg.as_str() {
                    "--compact" => schema = Schema::Compact,
                    "--out" => out = Some(iter.next().context("--out needs a file name")?.clone()),
                    _ => scope_parts.push(arg.clone()),
                }
            }
            let scope = scope_args(&store, &scope_parts)?;
            let csv = export_csv(&store, scope, schema)?;
            let path = out.unwrap_or_else(|| export_file_name(scope));
            std::fs::write(&path, csv).with_context(|| format!("failed to write {}", path))?;
            println!("Exported {} to {}", scope, path);
        }
        "import" => {
            let Some(path) = rest.first() else {
                bail!("import needs a CSV file\n{}", USAGE);
            };
            let text = std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path))?;
            let active = scope_args(&store, &rest[1..])?;
            let summary = import_csv(&mut store, &text, active);
            file.save_store(&store)?;
            println!(
                "Imported {} of {} rows ({} skipped, {} new students)",
                summary.imported, summary.rows_read, summary.skipped, summary.students_created
            );
            for (vehicle, name) in &summary.vehicles_renamed {
                println!("  - vehicle {} renamed to {}", vehicle.ordinal(), name);
            }
        }
        "help" | "--help" | "-h" => println!("{}", USAGE),
        other => bail!("unknown command `{}`\n{}", other, USAGE),
    }

    Ok(())
}
