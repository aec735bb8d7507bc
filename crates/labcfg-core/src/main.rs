use anyhow::{Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use labcfg_core::{
    EngineConfig, Envelope, InMemoryStore, ReconcileService, SlotKey, SubmitRequest,
};
use labcfg_reconcile::ChangeSet;
use labcfg_record::types::lab_catalog;
use labcfg_record::{RecordId, VariantCatalog};
use labcfg_xref::Scope;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Natural keys file: `{ "<kind>": { "<key>": id | [ids] } }`
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum KeyIds {
    One(i64),
    Many(Vec<i64>),
}

fn slot_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("config")
                .long("config")
                .value_parser(value_parser!(PathBuf))
                .help("Engine configuration (TOML); built-in slots when omitted"),
        )
        .arg(
            Arg::new("slot")
                .long("slot")
                .required(true)
                .help("Slot name, e.g. fields"),
        )
        .arg(
            Arg::new("submitted")
                .long("submitted")
                .required(true)
                .value_parser(value_parser!(PathBuf))
                .help("Submitted snapshot (JSON array)"),
        )
        .arg(
            Arg::new("persisted")
                .long("persisted")
                .value_parser(value_parser!(PathBuf))
                .help("Persisted snapshot (JSON array); empty slot when omitted"),
        )
        .arg(
            Arg::new("keys")
                .long("keys")
                .value_parser(value_parser!(PathBuf))
                .help("Natural keys to register before resolving (JSON)"),
        )
        .arg(
            Arg::new("tenant")
                .long("tenant")
                .default_value("1")
                .value_parser(value_parser!(i64))
                .help("Tenant id"),
        )
        .arg(
            Arg::new("root")
                .long("root")
                .default_value("1")
                .value_parser(value_parser!(i64))
                .help("Root id owning the slot"),
        )
}

fn cli() -> Command {
    Command::new("labcfg")
        .version(labcfg_core::VERSION)
        .about("Lab configuration child-collection reconciler")
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .global(true)
                .default_value("text")
                .value_parser(["text", "json"])
                .help("Log output format (filter with RUST_LOG)"),
        )
        .subcommand_required(true)
        .subcommand(slot_args(
            Command::new("plan").about("Print the change set for a submission"),
        ))
        .subcommand(slot_args(
            Command::new("apply")
                .about("Run the full pipeline against an in-memory store and print the envelope"),
        ))
        .subcommand(
            Command::new("catalog")
                .about("List registered variants and their attributes")
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Output as JSON"),
                ),
        )
}

fn init_tracing(format: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn read_json(path: &PathBuf) -> Result<Value> {
    let text =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

/// Store, service and request built from the slot arguments
fn prepare(args: &ArgMatches) -> Result<(InMemoryStore, ReconcileService, SubmitRequest)> {
    let config = match args.get_one::<PathBuf>("config") {
        Some(path) => EngineConfig::from_file(path)?,
        None => EngineConfig::lab_defaults(),
    };
    let service = ReconcileService::new(config, Arc::new(lab_catalog()));

    let slot_name = args
        .get_one::<String>("slot")
        .context("--slot is required")?;
    let tenant = *args.get_one::<i64>("tenant").context("--tenant is required")?;
    let root = *args.get_one::<i64>("root").context("--root is required")?;
    let root_kind = service
        .config()
        .slot(slot_name)
        .map(|slot| slot.root_kind.clone())
        .unwrap_or_default();
    let slot = SlotKey::new(tenant, root_kind, root, slot_name.clone());

    let store = InMemoryStore::new();
    let persisted = match args.get_one::<PathBuf>("persisted") {
        Some(path) => service
            .codec()
            .decode_snapshot(&read_json(path)?)
            .with_context(|| format!("decoding {}", path.display()))?,
        None => Vec::new(),
    };
    store.seed_slot(&slot, persisted);

    if let Some(path) = args.get_one::<PathBuf>("keys") {
        let keys: BTreeMap<String, BTreeMap<String, KeyIds>> =
            serde_json::from_value(read_json(path)?)
                .with_context(|| format!("decoding {}", path.display()))?;
        for (kind, entries) in keys {
            let scope = Scope::new(tenant, kind);
            for (key, ids) in entries {
                let ids = match ids {
                    KeyIds::One(id) => vec![id],
                    KeyIds::Many(ids) => ids,
                };
                for id in ids {
                    store.register_key(&scope, &key, RecordId::new(id));
                }
            }
        }
    }

    let submitted_path = args
        .get_one::<PathBuf>("submitted")
        .context("--submitted is required")?;
    let records = service
        .codec()
        .decode_snapshot(&read_json(submitted_path)?)
        .with_context(|| format!("decoding {}", submitted_path.display()))?;

    Ok((store, service, SubmitRequest::new(slot, records)))
}

fn describe_catalog(catalog: &VariantCatalog, as_json: bool) -> String {
    if as_json {
        let entries: Vec<Value> = catalog
            .entries()
            .map(|entry| {
                let attributes: Vec<Value> = entry
                    .schema()
                    .iter()
                    .map(|spec| {
                        json!({
                            "name": spec.name,
                            "kind": spec.kind.describe(),
                            "required": spec.required,
                        })
                    })
                    .collect();
                json!({ "tag": entry.tag().as_str(), "attributes": attributes })
            })
            .collect();
        return serde_json::to_string_pretty(&entries).unwrap_or_default();
    }

    let mut out = String::new();
    for entry in catalog.entries() {
        out.push_str(entry.tag().as_str());
        out.push('\n');
        for spec in entry.schema().iter() {
            let marker = if spec.required { " (required)" } else { "" };
            out.push_str(&format!("  {}: {}{}\n", spec.name, spec.kind.describe(), marker));
        }
    }
    out
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = cli().get_matches();
    let log_format = matches
        .get_one::<String>("log-format")
        .map_or("text", String::as_str);
    init_tracing(log_format);

    match matches.subcommand() {
        Some(("plan", args)) => {
            let (store, service, request) = prepare(args)?;
            let session = store.session();
            match service.plan(&session, &request).await {
                Ok(changes) => println!("{}", serde_json::to_string_pretty(&changes)?),
                Err(err) => {
                    let envelope = Envelope::<ChangeSet>::from_error(&err);
                    println!("{}", serde_json::to_string_pretty(&envelope)?);
                    std::process::exit(1);
                }
            }
        }
        Some(("apply", args)) => {
            let (store, service, request) = prepare(args)?;
            let mut session = store.session();
            let envelope = service.submit(&mut session, request).await;
            println!("{}", serde_json::to_string_pretty(&envelope)?);
            if !envelope.success {
                std::process::exit(1);
            }
        }
        Some(("catalog", args)) => {
            print!("{}", describe_catalog(&lab_catalog(), args.get_flag("json")));
        }
        _ => {}
    }
    Ok(())
}
