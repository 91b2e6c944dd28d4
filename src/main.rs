use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use dotenvy::dotenv;
use tracing::{error, info, warn};

mod config;
mod db;
mod llm;
mod portrait;
mod state;
mod studio;
mod templates;
mod utils;

use config::Config;
use db::database::Database;
use state::AppState;
use studio::{
    generate_character, generate_scenario, portrait_for, CharacterProfile, CharacterRequest,
    Generated, SavedCollection, Scenario, ScenarioRequest, CHARACTERS_KEY, SCENARIOS_KEY,
};
use templates::model::variable_id;
use templates::{PatternCategory, PatternDraft, TemplateStore, VariableCategory, VariableDraft};
use utils::logging::init_logging;
use utils::timing::{complete_command_timer, start_command_timer};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SavedKind {
    Characters,
    Scenarios,
    All,
}

#[derive(Debug, PartialEq)]
enum CliCommand {
    Help,
    TemplatesList,
    TemplatesShow {
        id: String,
    },
    TemplatesRender {
        id: String,
        values: HashMap<String, String>,
    },
    TemplatesSetPattern {
        name: String,
        template: String,
        description: Option<String>,
        category: Option<PatternCategory>,
    },
    TemplatesSetVariable {
        name: String,
        default_value: String,
        description: String,
        category: VariableCategory,
        create_only: bool,
    },
    TemplatesRemove {
        id: String,
    },
    TemplatesReset,
    Status,
    Character {
        name: String,
        age: u32,
        appearance: Option<String>,
        personality: Option<String>,
        background: Option<String>,
        values: HashMap<String, String>,
        with_portrait: bool,
        out: Option<PathBuf>,
    },
    Scenario {
        setting: String,
        characters: Vec<String>,
        tone: Option<String>,
    },
    Portrait {
        description: String,
        width: Option<u32>,
        height: Option<u32>,
        out: Option<PathBuf>,
        placeholder_only: bool,
    },
    SavedList {
        kind: SavedKind,
    },
    SavedDelete {
        id: String,
    },
}

impl CliCommand {
    fn name(&self) -> &'static str {
        match self {
            CliCommand::Help => "help",
            CliCommand::TemplatesList => "templates.list",
            CliCommand::TemplatesShow { .. } => "templates.show",
            CliCommand::TemplatesRender { .. } => "templates.render",
            CliCommand::TemplatesSetPattern { .. } => "templates.set-pattern",
            CliCommand::TemplatesSetVariable { .. } => "templates.set-variable",
            CliCommand::TemplatesRemove { .. } => "templates.remove",
            CliCommand::TemplatesReset => "templates.reset",
            CliCommand::Status => "status",
            CliCommand::Character { .. } => "character",
            CliCommand::Scenario { .. } => "scenario",
            CliCommand::Portrait { .. } => "portrait",
            CliCommand::SavedList { .. } => "saved.list",
            CliCommand::SavedDelete { .. } => "saved.delete",
        }
    }
}

fn usage() -> &'static str {
    "Usage:
  character-studio templates list
  character-studio templates show <id>
  character-studio templates render <pattern-id> [--set <name>=<value>]...
  character-studio templates set-pattern --name <name> --template <text> [--description <text>] [--category <category>]
  character-studio templates set-variable --name <name> --default <value> [--description <text>] [--category <category>] [--new]
  character-studio templates remove <id>
  character-studio templates reset
  character-studio status
  character-studio character --name <name> --age <years> [--appearance <text>] [--personality <text>] [--background <text>] [--set <name>=<value>]... [--portrait] [--out <file>]
  character-studio scenario --setting <text> --character <name>... [--tone <text>]
  character-studio portrait --description <text> [--width <px>] [--height <px>] [--out <file>] [--placeholder]
  character-studio saved list [characters|scenarios]
  character-studio saved delete <id>"
}

fn take_value<'a>(args: &'a [String], index: &mut usize, flag: &str) -> Result<&'a str> {
    *index += 1;
    args.get(*index)
        .map(|value| value.as_str())
        .ok_or_else(|| anyhow!("Missing value for {flag}"))
}

fn parse_number(value: &str, flag: &str) -> Result<u32> {
    value
        .trim()
        .parse::<u32>()
        .map_err(|_| anyhow!("Invalid {flag} value: {value}"))
}

fn parse_assignment(value: &str) -> Result<(String, String)> {
    let (name, assigned) = value
        .split_once('=')
        .ok_or_else(|| anyhow!("Expected <name>=<value>, got: {value}"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(anyhow!("Expected <name>=<value>, got: {value}"));
    }
    Ok((name.to_string(), assigned.to_string()))
}

fn positional<'a>(args: &'a [String], index: usize, what: &str) -> Result<&'a str> {
    args.get(index)
        .map(|value| value.as_str())
        .filter(|value| !value.starts_with("--"))
        .ok_or_else(|| anyhow!("Missing {what}"))
}

fn parse_templates_args(args: &[String]) -> Result<CliCommand> {
    let action = args.get(2).map(|value| value.as_str());
    match action {
        Some("list") => Ok(CliCommand::TemplatesList),
        Some("reset") => Ok(CliCommand::TemplatesReset),
        Some("remove") => Ok(CliCommand::TemplatesRemove {
            id: positional(args, 3, "template id")?.to_string(),
        }),
        Some("show") => Ok(CliCommand::TemplatesShow {
            id: positional(args, 3, "template id")?.to_string(),
        }),
        Some("render") => {
            let id = positional(args, 3, "pattern id")?.to_string();
            let mut values = HashMap::new();
            let mut index = 4;
            while index < args.len() {
                match args[index].as_str() {
                    "--set" => {
                        let (name, value) = parse_assignment(take_value(args, &mut index, "--set")?)?;
                        values.insert(name, value);
                    }
                    other => return Err(anyhow!("Unknown templates render argument: {other}")),
                }
                index += 1;
            }
            Ok(CliCommand::TemplatesRender { id, values })
        }
        Some("set-pattern") => {
            let mut name = None;
            let mut template = None;
            let mut description = None;
            let mut category = None;
            let mut index = 3;
            while index < args.len() {
                match args[index].as_str() {
                    "--name" => name = Some(take_value(args, &mut index, "--name")?.to_string()),
                    "--template" => {
                        template = Some(take_value(args, &mut index, "--template")?.to_string())
                    }
                    "--description" => {
                        description =
                            Some(take_value(args, &mut index, "--description")?.to_string())
                    }
                    "--category" => {
                        category = Some(
                            take_value(args, &mut index, "--category")?
                                .parse()
                                .map_err(|err: String| anyhow!(err))?,
                        )
                    }
                    other => return Err(anyhow!("Unknown set-pattern argument: {other}")),
                }
                index += 1;
            }
            Ok(CliCommand::TemplatesSetPattern {
                name: name.ok_or_else(|| anyhow!("--name is required"))?,
                template: template.ok_or_else(|| anyhow!("--template is required"))?,
                description,
                category,
            })
        }
        Some("set-variable") => {
            let mut name = None;
            let mut default_value = None;
            let mut description = String::new();
            let mut category = VariableCategory::Custom;
            let mut create_only = false;
            let mut index = 3;
            while index < args.len() {
                match args[index].as_str() {
                    "--name" => name = Some(take_value(args, &mut index, "--name")?.to_string()),
                    "--default" => {
                        default_value = Some(take_value(args, &mut index, "--default")?.to_string())
                    }
                    "--description" => {
                        description = take_value(args, &mut index, "--description")?.to_string()
                    }
                    "--category" => {
                        category = take_value(args, &mut index, "--category")?
                            .parse()
                            .map_err(|err: String| anyhow!(err))?
                    }
                    "--new" => create_only = true,
                    other => return Err(anyhow!("Unknown set-variable argument: {other}")),
                }
                index += 1;
            }
            Ok(CliCommand::TemplatesSetVariable {
                name: name.ok_or_else(|| anyhow!("--name is required"))?,
                default_value: default_value.ok_or_else(|| anyhow!("--default is required"))?,
                description,
                category,
                create_only,
            })
        }
        Some(other) => Err(anyhow!("Unknown templates action: {other}")),
        None => Err(anyhow!("Missing templates action")),
    }
}

fn parse_character_args(args: &[String]) -> Result<CliCommand> {
    let mut name = None;
    let mut age = None;
    let mut appearance = None;
    let mut personality = None;
    let mut background = None;
    let mut values = HashMap::new();
    let mut with_portrait = false;
    let mut out = None;

    let mut index = 2;
    while index < args.len() {
        match args[index].as_str() {
            "--name" => name = Some(take_value(args, &mut index, "--name")?.to_string()),
            "--age" => age = Some(parse_number(take_value(args, &mut index, "--age")?, "--age")?),
            "--appearance" => {
                appearance = Some(take_value(args, &mut index, "--appearance")?.to_string())
            }
            "--personality" => {
                personality = Some(take_value(args, &mut index, "--personality")?.to_string())
            }
            "--background" => {
                background = Some(take_value(args, &mut index, "--background")?.to_string())
            }
            "--set" => {
                let (name, value) = parse_assignment(take_value(args, &mut index, "--set")?)?;
                values.insert(name, value);
            }
            "--portrait" => with_portrait = true,
            "--out" => {
                out = Some(PathBuf::from(take_value(args, &mut index, "--out")?));
                with_portrait = true;
            }
            other => return Err(anyhow!("Unknown character argument: {other}")),
        }
        index += 1;
    }

    Ok(CliCommand::Character {
        name: name.ok_or_else(|| anyhow!("--name is required"))?,
        age: age.ok_or_else(|| anyhow!("--age is required"))?,
        appearance,
        personality,
        background,
        values,
        with_portrait,
        out,
    })
}

fn parse_scenario_args(args: &[String]) -> Result<CliCommand> {
    let mut setting = None;
    let mut characters = Vec::new();
    let mut tone = None;

    let mut index = 2;
    while index < args.len() {
        match args[index].as_str() {
            "--setting" => setting = Some(take_value(args, &mut index, "--setting")?.to_string()),
            "--character" => {
                characters.push(take_value(args, &mut index, "--character")?.to_string())
            }
            "--tone" => tone = Some(take_value(args, &mut index, "--tone")?.to_string()),
            other => return Err(anyhow!("Unknown scenario argument: {other}")),
        }
        index += 1;
    }

    Ok(CliCommand::Scenario {
        setting: setting.ok_or_else(|| anyhow!("--setting is required"))?,
        characters,
        tone,
    })
}

fn parse_portrait_args(args: &[String]) -> Result<CliCommand> {
    let mut description = None;
    let mut width = None;
    let mut height = None;
    let mut out = None;
    let mut placeholder_only = false;

    let mut index = 2;
    while index < args.len() {
        match args[index].as_str() {
            "--description" => {
                description = Some(take_value(args, &mut index, "--description")?.to_string())
            }
            "--width" => {
                width = Some(parse_number(take_value(args, &mut index, "--width")?, "--width")?)
            }
            "--height" => {
                height = Some(parse_number(
                    take_value(args, &mut index, "--height")?,
                    "--height",
                )?)
            }
            "--out" => out = Some(PathBuf::from(take_value(args, &mut index, "--out")?)),
            "--placeholder" => placeholder_only = true,
            other => return Err(anyhow!("Unknown portrait argument: {other}")),
        }
        index += 1;
    }

    Ok(CliCommand::Portrait {
        description: description.unwrap_or_default(),
        width,
        height,
        out,
        placeholder_only,
    })
}

fn parse_saved_args(args: &[String]) -> Result<CliCommand> {
    match args.get(2).map(|value| value.as_str()) {
        Some("list") => {
            let kind = match args.get(3).map(|value| value.as_str()) {
                None => SavedKind::All,
                Some("characters") => SavedKind::Characters,
                Some("scenarios") => SavedKind::Scenarios,
                Some(other) => return Err(anyhow!("Unknown saved collection: {other}")),
            };
            Ok(CliCommand::SavedList { kind })
        }
        Some("delete") => Ok(CliCommand::SavedDelete {
            id: positional(args, 3, "saved id")?.to_string(),
        }),
        Some(other) => Err(anyhow!("Unknown saved action: {other}")),
        None => Err(anyhow!("Missing saved action")),
    }
}

fn parse_args(args: &[String]) -> Result<CliCommand> {
    match args.get(1).map(|value| value.as_str()) {
        None | Some("help") | Some("--help") | Some("-h") => Ok(CliCommand::Help),
        Some("status") => Ok(CliCommand::Status),
        Some("templates") => parse_templates_args(args),
        Some("character") => parse_character_args(args),
        Some("scenario") => parse_scenario_args(args),
        Some("portrait") => parse_portrait_args(args),
        Some("saved") => parse_saved_args(args),
        Some(other) => Err(anyhow!("Unknown command: {other}")),
    }
}

/// Opens the configured store, falling back to an in-memory one so the
/// session stays usable when the file cannot be opened.
async fn open_state(config: Arc<Config>) -> Result<AppState> {
    match Database::init(&config.database_url).await {
        Ok(db) => Ok(AppState::new(config, db)),
        Err(err) => {
            error!(
                "Failed to open database {}: {:#}; continuing with an in-memory store",
                config.database_url, err
            );
            eprintln!("notice: saved data is unavailable this session ({err}); nothing will be kept");
            let db = Database::in_memory().await?;
            Ok(AppState::degraded(config, db))
        }
    }
}

fn print_notices<T>(generated: &Generated<T>) {
    for notice in &generated.notices {
        eprintln!("notice: {notice}");
    }
}

async fn write_image(locator: &str, path: &Path) -> Result<()> {
    let bytes = if locator.starts_with("data:") {
        portrait::decode_data_url(locator)?.1
    } else {
        let response = utils::http::get_http_client()
            .get(locator)
            .send()
            .await?
            .error_for_status()?;
        response.bytes().await?.to_vec()
    };
    tokio::fs::write(path, &bytes).await?;
    info!("Wrote {} bytes to {}", bytes.len(), path.display());
    Ok(())
}

async fn run_templates(state: &AppState, command: CliCommand) -> Result<()> {
    let mut engine = TemplateStore::load(&state.db).await?;
    match command {
        CliCommand::TemplatesList => {
            println!("Variables:");
            for variable in engine.variables() {
                println!(
                    "  {:<14} [{}] default: {}",
                    variable.id, variable.category, variable.default_value
                );
            }
            println!("Patterns:");
            for pattern in engine.patterns() {
                println!(
                    "  {:<20} [{}] uses: {}",
                    pattern.id,
                    pattern.category,
                    pattern.variables().join(", ")
                );
            }
        }
        CliCommand::TemplatesShow { id } => {
            if let Some(pattern) = engine.get_pattern(&id) {
                println!("{} ({})\n{}\n\n{}", pattern.name, pattern.category, pattern.description, pattern.template());
            } else if let Some(variable) = engine.get_variable(&id) {
                println!(
                    "{} ({})\n{}\ndefault: {}",
                    variable.name, variable.category, variable.description, variable.default_value
                );
            } else {
                return Err(anyhow!("No template variable or pattern named '{id}'"));
            }
        }
        CliCommand::TemplatesRender { id, values } => {
            let rendered = engine
                .render_pattern(&id, &values)
                .ok_or_else(|| templates::TemplateError::UnknownPattern(id.clone()))?;
            println!("{rendered}");
        }
        CliCommand::TemplatesSetPattern {
            name,
            template,
            description,
            category,
        } => {
            let existing = engine.get_pattern(&variable_id(&name)).cloned();
            let id = match existing {
                // Only the text changed: keep the stored name and description.
                Some(pattern) if description.is_none() && category.is_none() => {
                    engine.update_pattern_template(&pattern.id, &template)?;
                    pattern.id
                }
                existing => engine.save_pattern(PatternDraft {
                    name,
                    description: description
                        .or_else(|| existing.as_ref().map(|pattern| pattern.description.clone()))
                        .unwrap_or_default(),
                    template,
                    category: category
                        .or_else(|| existing.as_ref().map(|pattern| pattern.category))
                        .unwrap_or(PatternCategory::Custom),
                })?,
            };
            TemplateStore::save(&state.db, &engine).await?;
            println!("Saved pattern '{id}'");
        }
        CliCommand::TemplatesSetVariable {
            name,
            default_value,
            description,
            category,
            create_only,
        } => {
            let draft = VariableDraft {
                name,
                description,
                default_value,
                category,
            };
            let id = if create_only {
                engine.add_variable(draft)?
            } else {
                engine.save_variable(draft)?
            };
            TemplateStore::save(&state.db, &engine).await?;
            println!("Saved variable '{id}'");
        }
        CliCommand::TemplatesRemove { id } => {
            if engine.remove_pattern(&id).is_some() {
                println!("Removed pattern '{id}'");
            } else if engine.remove_variable(&id).is_some() {
                println!("Removed variable '{id}'");
            } else {
                return Err(anyhow!("No template variable or pattern named '{id}'"));
            }
            TemplateStore::save(&state.db, &engine).await?;
        }
        CliCommand::TemplatesReset => {
            let engine = TemplateStore::reset(&state.db).await?;
            println!(
                "Templates reset: {} variables, {} patterns",
                engine.variables().count(),
                engine.patterns().count()
            );
        }
        other => return Err(anyhow!("Not a templates command: {}", other.name())),
    }
    Ok(())
}

async fn run_status(state: &AppState) -> Result<()> {
    let config = &state.config;
    println!(
        "Text model: {} ({})",
        config.text.model,
        if config.text.api_key.trim().is_empty() { "no API key" } else { "API key set" }
    );
    println!(
        "Image model: {} ({})",
        config.image.model,
        if config.image.is_configured() { "enabled" } else { "placeholder portraits only" }
    );
    if state.degraded {
        println!("Store: in-memory fallback, {} could not be opened", config.database_url);
    } else {
        println!("Store: {}", config.database_url);
    }
    match state.db.health_check().await {
        Ok(()) => println!("Store health: ok"),
        Err(err) => println!("Store health: failing ({err})"),
    }
    let keys = state.db.keys().await?;
    if keys.is_empty() {
        println!("Stored keys: none");
    } else {
        println!("Stored keys: {}", keys.join(", "));
    }
    Ok(())
}

async fn run_saved(state: &AppState, command: CliCommand) -> Result<()> {
    let mut characters = SavedCollection::<CharacterProfile>::open(&state.db, CHARACTERS_KEY).await?;
    let mut scenarios = SavedCollection::<Scenario>::open(&state.db, SCENARIOS_KEY).await?;
    match command {
        CliCommand::SavedList { kind } => {
            if kind != SavedKind::Scenarios {
                println!("Characters:");
                for character in characters.list() {
                    println!(
                        "  {}  {} ({}){}",
                        character.id,
                        character.name,
                        character.age,
                        if character.portrait.is_some() { " [portrait]" } else { "" }
                    );
                }
            }
            if kind != SavedKind::Characters {
                println!("Scenarios:");
                for scenario in scenarios.list() {
                    println!(
                        "  {}  {} with {}",
                        scenario.id,
                        scenario.setting,
                        scenario.characters.join(", ")
                    );
                }
            }
        }
        CliCommand::SavedDelete { id } => {
            let removed = characters.delete(&id).await? || scenarios.delete(&id).await?;
            if !removed {
                return Err(anyhow!("Nothing saved with id '{id}'"));
            }
            println!("Deleted '{id}'");
        }
        other => return Err(anyhow!("Not a saved command: {}", other.name())),
    }
    Ok(())
}

async fn run(state: &AppState, command: CliCommand) -> Result<()> {
    match command {
        CliCommand::Help => println!("{}", usage()),
        CliCommand::TemplatesList
        | CliCommand::TemplatesShow { .. }
        | CliCommand::TemplatesRender { .. }
        | CliCommand::TemplatesSetPattern { .. }
        | CliCommand::TemplatesSetVariable { .. }
        | CliCommand::TemplatesRemove { .. }
        | CliCommand::TemplatesReset => run_templates(state, command).await?,
        CliCommand::Status => run_status(state).await?,
        CliCommand::SavedList { .. } | CliCommand::SavedDelete { .. } => {
            run_saved(state, command).await?
        }
        CliCommand::Character {
            name,
            age,
            appearance,
            personality,
            background,
            values,
            with_portrait,
            out,
        } => {
            let engine = TemplateStore::load(&state.db).await?;
            let request = CharacterRequest {
                name,
                age,
                appearance,
                personality,
                background,
                values,
            };
            let generated = generate_character(state, &engine, &request, with_portrait).await?;
            print_notices(&generated);
            let character = &generated.value;
            println!("{} ({}), saved as {}\n\n{}", character.name, character.age, character.id, character.profile);
            if let (Some(path), Some(portrait)) = (out, character.portrait.as_deref()) {
                write_image(portrait, &path).await?;
                println!("\nPortrait written to {}", path.display());
            }
        }
        CliCommand::Scenario {
            setting,
            characters,
            tone,
        } => {
            let engine = TemplateStore::load(&state.db).await?;
            let request = ScenarioRequest {
                setting,
                characters,
                tone,
            };
            let generated = generate_scenario(state, &engine, &request).await?;
            print_notices(&generated);
            println!("Saved as {}\n\n{}", generated.value.id, generated.value.text);
        }
        CliCommand::Portrait {
            description,
            width,
            height,
            out,
            placeholder_only,
        } => {
            let width = width.unwrap_or(state.config.portrait_width);
            let height = height.unwrap_or(state.config.portrait_height);
            let generated = if placeholder_only {
                Generated::ok(portrait::generate_placeholder_image(&description, width, height))
            } else {
                portrait_for(state, &description, width, height).await
            };
            print_notices(&generated);
            match out {
                Some(path) => {
                    write_image(&generated.value, &path).await?;
                    println!("Portrait written to {}", path.display());
                }
                None => println!("{}", generated.value),
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let config = Arc::new(Config::load()?);
    let _guards = init_logging(&config.log_level, &config.logs_dir);

    let args: Vec<String> = std::env::args().collect();
    let command = match parse_args(&args) {
        Ok(command) => command,
        Err(err) => {
            warn!("Invalid arguments: {err}");
            eprintln!("{err}\n\n{}", usage());
            std::process::exit(2);
        }
    };
    if command == CliCommand::Help {
        println!("{}", usage());
        return Ok(());
    }

    let state = open_state(config).await?;
    if state.degraded {
        info!("Running with an in-memory store; results will not be kept");
    }
    if let Err(err) = state.db.health_check().await {
        warn!("Database health check failed: {err}");
    }

    let command_name = command.name();
    let mut timer = start_command_timer(command_name, args.get(1..).unwrap_or_default());
    match run(&state, command).await {
        Ok(()) => {
            complete_command_timer(&mut timer, "success", None);
            Ok(())
        }
        Err(err) => {
            error!("Command {} failed: {:#}", command_name, err);
            complete_command_timer(&mut timer, "error", Some(err.to_string()));
            Err(err)
        }
    }
}
