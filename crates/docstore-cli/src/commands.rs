use anyhow::{bail, Context};
use colored::Colorize;
use docstore_data::{DataKind, DataObject, Document, GeneralData, UserData, WorldData};
use docstore_manager::{StorageConfig, StorageManager};
use docstore_repo::DataQuery;
use docstore_types::{node_from_json, node_to_json, DataKey, DataPath, Node};
use serde_json::Value;
use uuid::Uuid;

use crate::cli::*;

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    let mut config = StorageConfig::load(&cli.config)?;
    if let Some(data_dir) = cli.data_dir {
        config = config.with_data_dir(data_dir);
    }
    let manager = StorageManager::new(config)?;
    let format = cli.format;

    let result = match cli.command {
        Command::Show(args) => cmd_show(&manager, format, args).await,
        Command::List(args) => cmd_list(&manager, format, args).await,
        Command::Get(args) => cmd_get(&manager, format, args).await,
        Command::Set(args) => cmd_set(&manager, args).await,
        Command::Remove(args) => cmd_remove(&manager, args).await,
        Command::Delete(args) => cmd_delete(&manager, args).await,
    };
    manager.shutdown().await?;
    result
}

async fn cmd_show(manager: &StorageManager, format: OutputFormat, args: ShowArgs) -> anyhow::Result<()> {
    let target = Target::new(args.kind, args.id)?;
    match load(manager, target).await? {
        Some(document) => {
            if format == OutputFormat::Text {
                println!("{}", target.to_string().cyan().bold());
            }
            print_value(format, &document_json(document)?)
        }
        None => not_found(format, target),
    }
}

async fn cmd_list(manager: &StorageManager, format: OutputFormat, args: ListArgs) -> anyhow::Result<()> {
    let query = DataQuery::all();
    let (label, ids): (_, Vec<Uuid>) = match args.collection {
        Collection::Users => ("users", manager.user_service().get_all(&query).await?.into_keys().collect()),
        Collection::Worlds => ("worlds", manager.world_service().get_all(&query).await?.into_keys().collect()),
    };
    match format {
        OutputFormat::Json => {
            let ids: Vec<String> = ids.iter().map(Uuid::to_string).collect();
            println!("{}", serde_json::to_string(&ids)?);
        }
        OutputFormat::Text => {
            for id in &ids {
                println!("{}", id.to_string().yellow());
            }
            println!("{} {}", ids.len().to_string().bold(), label);
        }
    }
    Ok(())
}

async fn cmd_get(manager: &StorageManager, format: OutputFormat, args: GetArgs) -> anyhow::Result<()> {
    let (target, rest) = split_operands(args.kind, &args.operands, 1)?;
    let path = parse_path(&rest[0])?;
    let Some(document) = load(manager, target).await? else {
        return not_found(format, target);
    };
    match document.node(&path) {
        Some(node) => print_value(format, &node_to_json(node)?),
        None => {
            match format {
                OutputFormat::Json => println!("null"),
                OutputFormat::Text => println!("{} {}", path.to_string().bold(), "(not set)".dimmed()),
            }
            Ok(())
        }
    }
}

async fn cmd_set(manager: &StorageManager, args: SetArgs) -> anyhow::Result<()> {
    let (target, rest) = split_operands(args.kind, &args.operands, 2)?;
    let path = parse_path(&rest[0])?;
    let value: Value = serde_json::from_str(&rest[1])
        .with_context(|| format!("value is not valid JSON: {}", rest[1]))?;
    if value.is_null() {
        bail!("cannot store null; use `remove` to clear {path}");
    }

    let document = load(manager, target).await?.unwrap_or_default();
    let (document, _) = apply(target, document, &path, Edit::Set(node_from_json(&value)))?;
    store(manager, target, document).await?;
    println!("{} Set {} on {}", "✓".green().bold(), path.to_string().bold(), target);
    Ok(())
}

async fn cmd_remove(manager: &StorageManager, args: RemoveArgs) -> anyhow::Result<()> {
    let (target, rest) = split_operands(args.kind, &args.operands, 1)?;
    let path = parse_path(&rest[0])?;
    let Some(document) = load(manager, target).await? else {
        bail!("no {target} document");
    };
    let (document, removed) = apply(target, document, &path, Edit::Remove)?;
    if removed {
        store(manager, target, document).await?;
        println!("{} Removed {} from {}", "✓".green().bold(), path.to_string().bold(), target);
    } else {
        println!("{} {}", path.to_string().bold(), "(not set)".dimmed());
    }
    Ok(())
}

async fn cmd_delete(manager: &StorageManager, args: DeleteArgs) -> anyhow::Result<()> {
    let (target, deleted) = match args.kind {
        KeyedKind::User => (Target::User(args.id), manager.user_service().delete(args.id).await?),
        KeyedKind::World => (Target::World(args.id), manager.world_service().delete(args.id).await?),
    };
    if deleted {
        println!("{} Deleted {}", "✓".green().bold(), target);
    } else {
        println!("No {} document", target);
    }
    Ok(())
}

// ---- Documents ----

/// One document addressed from the command line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Target {
    General,
    User(Uuid),
    World(Uuid),
}

impl Target {
    fn new(kind: Kind, id: Option<Uuid>) -> anyhow::Result<Self> {
        match (kind, id) {
            (Kind::General, None) => Ok(Self::General),
            (Kind::General, Some(_)) => bail!("the general document has no id"),
            (Kind::User, Some(id)) => Ok(Self::User(id)),
            (Kind::World, Some(id)) => Ok(Self::World(id)),
            (Kind::User, None) => bail!("user documents need an id"),
            (Kind::World, None) => bail!("world documents need an id"),
        }
    }
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::General => f.write_str("general"),
            Self::User(id) => write!(f, "user {id}"),
            Self::World(id) => write!(f, "world {id}"),
        }
    }
}

enum Edit {
    Set(Node),
    Remove,
}

/// Split `[id] <rest..>` where exactly `rest_len` operands follow the id.
fn split_operands(kind: Kind, operands: &[String], rest_len: usize) -> anyhow::Result<(Target, &[String])> {
    let (id, rest) = match operands.len().checked_sub(rest_len) {
        Some(0) => (None, operands),
        Some(1) => {
            let (id, rest) = operands.split_at(1);
            let id = id[0].parse::<Uuid>().with_context(|| format!("invalid id: {}", id[0]))?;
            (Some(id), rest)
        }
        _ => bail!("expected [id] followed by {rest_len} argument(s)"),
    };
    Ok((Target::new(kind, id)?, rest))
}

fn parse_path(dotted: &str) -> anyhow::Result<DataPath> {
    DataPath::parse(dotted).with_context(|| format!("invalid path: {dotted}"))
}

async fn load(manager: &StorageManager, target: Target) -> anyhow::Result<Option<Document>> {
    Ok(match target {
        Target::General => manager.general_service().get().await?.map(DataObject::into_document),
        Target::User(id) => manager.get_user(id).await?.map(DataObject::into_document),
        Target::World(id) => manager.get_world(id).await?.map(DataObject::into_document),
    })
}

async fn store(manager: &StorageManager, target: Target, document: Document) -> anyhow::Result<()> {
    match target {
        Target::General => manager.save_general(DataObject::from_document(document)).await?,
        Target::User(id) => manager.save_user(id, DataObject::from_document(document)).await?,
        Target::World(id) => manager.save_world(id, DataObject::from_document(document)).await?,
    }
    Ok(())
}

/// Apply `edit` through a raw node key of the target's kind. Returns the
/// edited document and whether anything changed.
fn apply(target: Target, document: Document, path: &DataPath, edit: Edit) -> anyhow::Result<(Document, bool)> {
    match target {
        Target::General => apply_as::<GeneralData>(document, path, edit),
        Target::User(_) => apply_as::<UserData>(document, path, edit),
        Target::World(_) => apply_as::<WorldData>(document, path, edit),
    }
}

fn apply_as<O: DataKind>(document: Document, path: &DataPath, edit: Edit) -> anyhow::Result<(Document, bool)> {
    let mut object = DataObject::<O>::from_document(document);
    let key = DataKey::<Node, O>::from_path(path.clone());
    let changed = match edit {
        Edit::Set(node) => {
            object.set(&key, node)?;
            true
        }
        Edit::Remove => object.remove(&key),
    };
    Ok((object.into_document(), changed))
}

// ---- Output ----

fn document_json(document: Document) -> anyhow::Result<Value> {
    Ok(node_to_json(&Node::Map(document.into_root()))?)
}

fn print_value(format: OutputFormat, value: &Value) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string(value)?),
        OutputFormat::Text => println!("{}", serde_json::to_string_pretty(value)?),
    }
    Ok(())
}

fn not_found(format: OutputFormat, target: Target) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("null"),
        OutputFormat::Text => println!("No {} document", target),
    }
    Ok(())
}
