use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, anyhow};
use tracing::{debug, instrument, warn};

use crate::cli::{CategoryCommand, Command, EventCommand, FileCommand, TaskCommand};
use crate::datetime;
use crate::model::Priority;
use crate::remote::RemoteStore;
use crate::render::Renderer;
use crate::stores::events::{EventDraft, calendar_entries};
use crate::stores::files::{FileUpload, decode_data_uri};
use crate::stores::{CategoryStore, EventStore, FileStore, TaskStore};

/// The four stores for one application session, all sharing one injected
/// store handle. Constructed once and passed down; no ambient singletons.
pub struct App {
    pub categories: CategoryStore,
    pub files: FileStore,
    pub tasks: TaskStore,
    pub events: EventStore,
}

impl App {
    pub fn new(store: Arc<dyn RemoteStore>) -> Self {
        Self {
            categories: CategoryStore::new(Arc::clone(&store)),
            files: FileStore::new(Arc::clone(&store)),
            tasks: TaskStore::new(Arc::clone(&store)),
            events: EventStore::new(store),
        }
    }

    pub fn start(&mut self) -> anyhow::Result<()> {
        self.categories
            .start()
            .context("failed to subscribe to categories")?;
        self.files.start().context("failed to subscribe to files")?;
        self.tasks.start().context("failed to subscribe to tasks")?;
        self.events
            .start()
            .context("failed to subscribe to events")?;
        Ok(())
    }

    pub fn stop(&mut self) {
        self.categories.stop();
        self.files.stop();
        self.tasks.stop();
        self.events.stop();
    }
}

#[instrument(skip(app, renderer, command))]
pub fn dispatch(app: &mut App, renderer: &Arc<Renderer>, command: Command) -> anyhow::Result<()> {
    debug!(?command, "dispatching command");
    match command {
        Command::Category(cmd) => dispatch_category(app, renderer, cmd),
        Command::File(cmd) => dispatch_file(app, renderer, cmd),
        Command::Task(cmd) => dispatch_task(app, renderer, cmd),
        Command::Event(cmd) => dispatch_event(app, renderer, cmd),
        Command::Calendar => {
            renderer.print_calendar(&calendar_entries(&app.events.events(), &app.tasks.tasks()))
        }
    }
}

fn dispatch_category(
    app: &mut App,
    renderer: &Arc<Renderer>,
    cmd: CategoryCommand,
) -> anyhow::Result<()> {
    match cmd {
        CategoryCommand::Add { name } => {
            // Output comes from the cache-update callback, never directly
            // from the mutation: what prints is what the store pushed back.
            let sink = Arc::clone(renderer);
            app.categories.on_change(move |categories| {
                if let Err(err) = sink.print_categories(categories) {
                    warn!(error = %err, "render failed");
                }
            });
            app.categories
                .add(&name)
                .context("failed to add category")?;
            Ok(())
        }
        CategoryCommand::List => renderer.print_categories(&app.categories.categories()),
        CategoryCommand::Delete { name, yes } => {
            let category = app
                .categories
                .find(&name)
                .ok_or_else(|| anyhow!("no such category: {name}"))?;
            let prompt =
                format!("Delete category \"{name}\" and every file inside it?");
            if !confirm(&prompt, yes)? {
                println!("aborted");
                return Ok(());
            }
            let removed = app
                .categories
                .delete(&category.id, &category.name)
                .context("failed to delete category")?;
            println!("deleted category \"{name}\" and {removed} file(s)");
            Ok(())
        }
    }
}

fn dispatch_file(app: &mut App, renderer: &Arc<Renderer>, cmd: FileCommand) -> anyhow::Result<()> {
    match cmd {
        FileCommand::Upload { category, path } => {
            if app.categories.find(&category).is_none() {
                return Err(anyhow!("no such category: {category}"));
            }
            let upload = FileUpload::from_path(&path)
                .with_context(|| format!("failed to read {}", path.display()))?;

            let sink = Arc::clone(renderer);
            app.files.on_change(move |records| {
                if let Err(err) = sink.print_files(records) {
                    warn!(error = %err, "render failed");
                }
            });
            let version = app
                .files
                .upload(&category, upload)
                .context("failed to upload file")?;
            println!("stored as version {version}");
            Ok(())
        }
        FileCommand::List { category } => {
            let grouped = app.files.by_category();
            match category {
                Some(name) => {
                    let records = grouped.get(&name).cloned().unwrap_or_default();
                    renderer.print_files(&records)
                }
                None => {
                    let records: Vec<_> = grouped.into_values().flatten().collect();
                    renderer.print_files(&records)
                }
            }
        }
        FileCommand::Download {
            category,
            name,
            output,
        } => {
            let record = app
                .files
                .find(&category, &name)
                .ok_or_else(|| anyhow!("no such file: {name} in {category}"))?;
            let (_mime, bytes) =
                decode_data_uri(&record.content).context("stored content is not a valid data URI")?;
            let target = output.unwrap_or_else(|| PathBuf::from(&record.name));
            fs::write(&target, bytes)
                .with_context(|| format!("failed to write {}", target.display()))?;
            println!("wrote {} ({}B)", target.display(), record.size);
            Ok(())
        }
        FileCommand::Delete {
            category,
            name,
            yes,
        } => {
            let record = app
                .files
                .find(&category, &name)
                .ok_or_else(|| anyhow!("no such file: {name} in {category}"))?;
            if !confirm(&format!("Delete file \"{name}\"?"), yes)? {
                println!("aborted");
                return Ok(());
            }
            app.files
                .delete(&record.id)
                .context("failed to delete file")?;
            println!("deleted \"{name}\"");
            Ok(())
        }
    }
}

fn dispatch_task(app: &mut App, renderer: &Arc<Renderer>, cmd: TaskCommand) -> anyhow::Result<()> {
    match cmd {
        TaskCommand::Add {
            text,
            date,
            priority,
            category,
        } => {
            let date = date.as_deref().map(datetime::parse_date).transpose()?;
            let priority = Priority::from_str(&priority)?;

            let sink = Arc::clone(renderer);
            app.tasks.on_change(move |tasks| {
                if let Err(err) = sink.print_tasks(tasks) {
                    warn!(error = %err, "render failed");
                }
            });
            app.tasks
                .add(&text, date, priority, &category)
                .context("failed to add task")?;
            Ok(())
        }
        TaskCommand::List { priority, category } => {
            let priority = parse_priority_filter(&priority)?;
            let category = match category.as_str() {
                "all" => None,
                other => Some(other),
            };
            renderer.print_tasks(&app.tasks.view(priority, category))
        }
        TaskCommand::Done { id } => {
            match app.tasks.toggle_completion(&id.as_str().into()) {
                Ok(()) => renderer.print_tasks(&app.tasks.view(None, None)),
                Err(err) if err.is_benign() => {
                    // Lost the race against a concurrent delete; nothing to
                    // do.
                    println!("task {id} no longer exists");
                    Ok(())
                }
                Err(err) => Err(err).context("failed to toggle task"),
            }
        }
        TaskCommand::Delete { id, yes } => {
            if !confirm("Delete this task?", yes)? {
                println!("aborted");
                return Ok(());
            }
            app.tasks
                .delete(&id.as_str().into())
                .context("failed to delete task")?;
            println!("deleted task {id}");
            Ok(())
        }
    }
}

fn dispatch_event(
    app: &mut App,
    renderer: &Arc<Renderer>,
    cmd: EventCommand,
) -> anyhow::Result<()> {
    match cmd {
        EventCommand::Add {
            title,
            date,
            start,
            end,
            location,
            event_type,
            description,
        } => {
            let draft = build_draft(title, &date, start, end, location, event_type, description)?;

            let sink = Arc::clone(renderer);
            app.events.on_change(move |events| {
                if let Err(err) = sink.print_events(events) {
                    warn!(error = %err, "render failed");
                }
            });
            app.events.add(&draft).context("failed to add event")?;
            Ok(())
        }
        EventCommand::List => renderer.print_events(&app.events.events()),
        EventCommand::Edit {
            id,
            title,
            date,
            start,
            end,
            location,
            event_type,
            description,
        } => {
            let draft = build_draft(title, &date, start, end, location, event_type, description)?;

            match app.events.begin_edit(&id.as_str().into()) {
                Ok(()) => {}
                Err(err) if err.is_benign() => {
                    println!("event {id} no longer exists");
                    return Ok(());
                }
                Err(err) => return Err(err).context("failed to open edit session"),
            }
            app.events.update(&draft).context("failed to update event")?;
            renderer.print_events(&app.events.events())
        }
        EventCommand::Delete { id, yes } => {
            if !confirm("Delete this event?", yes)? {
                println!("aborted");
                return Ok(());
            }
            app.events
                .delete(&id.as_str().into())
                .context("failed to delete event")?;
            println!("deleted event {id}");
            Ok(())
        }
    }
}

fn build_draft(
    title: String,
    date: &str,
    start: Option<String>,
    end: Option<String>,
    location: String,
    event_type: Option<String>,
    description: String,
) -> anyhow::Result<EventDraft> {
    Ok(EventDraft {
        title,
        date: Some(datetime::parse_date(date)?),
        start_time: start.as_deref().map(datetime::parse_time).transpose()?,
        end_time: end.as_deref().map(datetime::parse_time).transpose()?,
        location,
        event_type,
        description,
    })
}

fn parse_priority_filter(input: &str) -> anyhow::Result<Option<Priority>> {
    match input {
        "all" => Ok(None),
        other => Ok(Some(Priority::from_str(other)?)),
    }
}

fn confirm(prompt: &str, assume_yes: bool) -> anyhow::Result<bool> {
    if assume_yes {
        return Ok(true);
    }

    print!("{prompt} [y/N] ");
    io::stdout().flush().context("failed to flush stdout")?;

    let mut line = String::new();
    io::stdin()
        .read_line(&mut line)
        .context("failed reading stdin")?;
    Ok(matches!(
        line.trim().to_ascii_lowercase().as_str(),
        "y" | "yes"
    ))
}
