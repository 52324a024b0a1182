use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use platelog_camera::{CameraDevice, MockCamera, StillCamera};
use platelog_ops::{data_file_path, ensure_data_dir, init_tracing};
use platelog_orchestrator::{submit, CapturePipeline, PendingItem, PipelineSettings};
use platelog_store::{ItemQuery, ItemStore, JsonFileStore, KeyValueStore, UserRegistry};
use platelog_types::{
    config::{CameraConfig, PlatelogConfig},
    food::{parse_tags, FoodDraft, FoodItem, NutriGrade, Preference},
    vision::{CropRect, FacingMode, FrameSize},
    PlatelogError,
};
use platelog_vision::{analyzer_from_config, CropOutcome};
use tracing::info;
use uuid::Uuid;

mod ui;

#[derive(Parser)]
#[command(name = "platelog", version, about = "Personal food-preference tracker")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, env = "PLATELOG_CONFIG", default_value = "configs/dev.toml")]
    config: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create a username and sign in with it.
    Register { username: String },
    /// Sign in with an existing username.
    Login { username: String },
    Logout,
    /// Show the signed-in user.
    Whoami,
    /// Log an item by hand.
    Add(ItemFields),
    /// List items, optionally filtered.
    List(ListArgs),
    /// Delete an item by id.
    Delete { id: Uuid },
    /// Photograph an item, analyze it, crop it and log it.
    Capture(CaptureArgs),
    /// Browse items interactively.
    Browse,
}

#[derive(Args)]
struct ItemFields {
    #[arg(long)]
    name: Option<String>,
    /// Star rating, 1-5.
    #[arg(long)]
    rating: Option<u8>,
    #[arg(long)]
    notes: Option<String>,
    /// Nutrition grade A-E.
    #[arg(long)]
    grade: Option<NutriGrade>,
    /// Comma separated tags.
    #[arg(long)]
    tags: Option<String>,
}

#[derive(Args)]
struct ListArgs {
    #[arg(long)]
    search: Option<String>,
    #[arg(long)]
    tag: Option<String>,
    #[arg(long)]
    grade: Option<NutriGrade>,
    #[arg(long)]
    min_rating: Option<u8>,
    /// `liked` (4-5 stars), `disliked` (1-2 stars) or `all`.
    #[arg(long, default_value = "all")]
    preference: Preference,
}

#[derive(Args)]
struct CaptureArgs {
    /// Use an image file instead of the camera.
    #[arg(long)]
    file: Option<PathBuf>,
    /// Crop selection as `x,y,width` in percent of the image.
    #[arg(long, conflicts_with = "no_crop")]
    crop: Option<String>,
    /// Keep the full image.
    #[arg(long)]
    no_crop: bool,
    #[command(flatten)]
    fields: ItemFields,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli.config);
    init_tracing(&config.ops)?;
    ensure_data_dir(&config.ops.data_dir)?;

    let store = JsonFileStore::open(data_file_path(&config))?;
    info!("Using store at {}", store.path().display());

    match cli.command {
        Command::Register { username } => {
            let name = UserRegistry::new(&store).register(&username)?;
            println!("Registered and signed in as {name}");
        }
        Command::Login { username } => {
            let name = UserRegistry::new(&store).login(&username)?;
            println!("Signed in as {name}");
        }
        Command::Logout => {
            UserRegistry::new(&store).logout()?;
            println!("Signed out");
        }
        Command::Whoami => match UserRegistry::new(&store).current_user()? {
            Some(name) => println!("{name}"),
            None => println!("Not signed in"),
        },
        Command::Add(fields) => {
            let items = user_items(&store)?;
            let mut draft = FoodDraft::default();
            fields.apply(&mut draft);
            let item = submit_or_explain(&items, draft)?;
            println!("Added {} ({})", item.name, item.id);
        }
        Command::List(args) => {
            let items = user_items(&store)?;
            let query = ItemQuery {
                search: args.search,
                tag: args.tag,
                grade: args.grade,
                min_rating: args.min_rating,
                preference: args.preference,
            };
            let found = items.find(&query)?;
            if found.is_empty() {
                println!("No items");
            }
            for item in &found {
                println!("{}", summary_line(item));
            }
        }
        Command::Delete { id } => {
            let items = user_items(&store)?;
            if items.delete(id)? {
                println!("Deleted {id}");
            } else {
                bail!("no item with id {id}");
            }
        }
        Command::Capture(args) => {
            let items = user_items(&store)?;
            run_capture(&config, &items, args).await?;
        }
        Command::Browse => {
            let items = user_items(&store)?;
            let summary = format!("{} @ {}", items.username(), store.path().display());
            ui::run(items.load()?, summary, |id| Ok(items.delete(id)?))?;
        }
    }
    Ok(())
}

impl ItemFields {
    fn apply(self, draft: &mut FoodDraft) {
        if let Some(name) = self.name {
            draft.name = name;
        }
        if let Some(rating) = self.rating {
            draft.rating = rating;
        }
        if self.notes.is_some() {
            draft.notes = self.notes;
        }
        if self.grade.is_some() {
            draft.nutri_score = self.grade;
        }
        if let Some(tags) = self.tags {
            draft.tags = parse_tags(&tags);
        }
    }
}

fn user_items<S: KeyValueStore>(store: &S) -> Result<ItemStore<'_, S>> {
    let user = UserRegistry::new(store)
        .current_user()?
        .ok_or_else(|| anyhow!("not signed in; run `platelog login <username>` first"))?;
    Ok(ItemStore::new(store, user))
}

fn submit_or_explain<S: KeyValueStore>(
    items: &ItemStore<'_, S>,
    draft: FoodDraft,
) -> Result<FoodItem> {
    match submit(items, draft) {
        Ok(item) => Ok(item),
        Err(PlatelogError::Validation(reason)) => bail!("{reason} (nothing was saved)"),
        Err(err) => Err(err.into()),
    }
}

fn camera_device(config: &CameraConfig) -> Box<dyn CameraDevice> {
    let facing = if config.front_facing {
        FacingMode::User
    } else {
        FacingMode::Environment
    };
    match &config.still_image {
        Some(path) => Box::new(StillCamera::new(path, facing)),
        None => Box::new(MockCamera::new(facing, FrameSize::new(1280, 720))),
    }
}

async fn run_capture<S: KeyValueStore>(
    config: &PlatelogConfig,
    items: &ItemStore<'_, S>,
    args: CaptureArgs,
) -> Result<()> {
    let pipeline = CapturePipeline::new(
        camera_device(&config.camera),
        analyzer_from_config(&config.analysis)?,
        PipelineSettings::from_config(config),
    );

    let review = match &args.file {
        Some(path) => pipeline.upload(path).await?,
        None => {
            if let Err(err) = pipeline.open_camera().await {
                pipeline.close_view()?;
                bail!("{err}. Use --file to log a photo instead.");
            }
            pipeline.capture().await?
        }
    };
    let review = review.context("nothing was captured")?;
    if let Some(notice) = &review.notice {
        eprintln!("warning: {notice}");
    }

    let mut editor = pipeline.crop_editor(&review)?;
    let outcome = if args.no_crop {
        editor.cancel()
    } else {
        if let Some(raw) = &args.crop {
            editor
                .adjust(parse_crop(raw)?)
                .context("image not loaded in crop editor")?;
        }
        editor.finish_gesture();
        match editor.confirm() {
            Some(outcome) => outcome,
            None => {
                eprintln!("warning: empty crop selection; keeping the full image");
                editor.cancel()
            }
        }
    };
    if let CropOutcome::Cropped(image) = &outcome {
        let FrameSize { width, height } = image.size();
        println!("Cropped to {width}x{height}");
    }

    let mut pending = PendingItem::from_review(review, outcome);
    args.fields.apply(&mut pending.draft);
    let item = submit_or_explain(items, pending.into_draft())?;
    println!("{}", summary_line(&item));
    Ok(())
}

fn parse_crop(raw: &str) -> Result<CropRect> {
    let parts = raw
        .split(',')
        .map(|p| p.trim().parse::<f64>())
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("invalid crop '{raw}'"))?;
    match parts.as_slice() {
        [x, y, width] => Ok(CropRect::new(*x, *y, *width, *width)),
        _ => bail!("crop must be `x,y,width`, got '{raw}'"),
    }
}

fn summary_line(item: &FoodItem) -> String {
    let grade = item
        .nutri_score
        .map(|g| format!(" [{g}]"))
        .unwrap_or_default();
    let tags = if item.tags.is_empty() {
        String::new()
    } else {
        format!(" #{}", item.tags.join(" #"))
    };
    let photo = if item.image.is_some() { " (photo)" } else { "" };
    format!(
        "{}  {}  {}{}{}{}",
        item.id,
        ui::stars(item.rating),
        item.name,
        grade,
        tags,
        photo
    )
}

fn load_config(path: &Path) -> PlatelogConfig {
    match PlatelogConfig::from_file(path) {
        Ok(cfg) => {
            if let Err(err) = cfg.validate() {
                eprintln!(
                    "Invalid config in '{}': {err}. Falling back to internal defaults.",
                    path.display()
                );
                default_config()
            } else {
                cfg
            }
        }
        Err(err) => {
            eprintln!(
                "Failed to load config from '{}': {err}. Falling back to internal defaults.",
                path.display()
            );
            default_config()
        }
    }
}

fn default_config() -> PlatelogConfig {
    let config = PlatelogConfig::default();
    debug_assert!(config.validate().is_ok());
    config
}
