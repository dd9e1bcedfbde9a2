//! ferrite-sync - Main Entry Point
//!
//! Lays a markdown file out headlessly, builds both sync tables and prints
//! them. With `--at`, scrolls one pane and reports where the other one lands.
//!
//! # Usage
//!
//! ```bash
//! ferrite-sync README.md
//! ferrite-sync README.md --at 1200 --from preview --json
//! ```

use std::cell::RefCell;
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::rc::Rc;

use clap::{Parser, ValueEnum};
use log::{debug, error, info};
use serde::Serialize;

use ferrite_sync::config::{load_config, load_config_from, save_config, SyncSettings};
use ferrite_sync::error::{Error, Result};
use ferrite_sync::layout::{EditorLayout, PreviewLayout};
use ferrite_sync::markdown::extract_anchor_blocks;
use ferrite_sync::preview::{AnchorTable, Pane, PaneExtents, ScrollPane, SyncScheduler};

/// Upper bound on frames simulated for one `--at` mapping.
const MAX_FRAMES: usize = 1_000;

/// Inspect editor/preview scroll synchronization for a markdown file
#[derive(Parser, Debug)]
#[command(name = "ferrite-sync", version, about, long_about = None)]
struct Cli {
    /// Markdown file to lay out
    #[arg(value_name = "FILE")]
    file: PathBuf,

    /// Editor line height in pixels
    #[arg(long, value_name = "PX")]
    line_height: Option<f32>,

    /// Viewport height of both panes in pixels
    #[arg(long, value_name = "PX")]
    viewport: Option<f32>,

    /// Scroll the source pane to this offset and report the mapped position
    #[arg(long, value_name = "PX")]
    at: Option<f32>,

    /// Pane the `--at` offset belongs to
    #[arg(long, value_enum, default_value = "editor")]
    from: SourceArg,

    /// Print JSON instead of text
    #[arg(long)]
    json: bool,

    /// Read sync settings from this file instead of the user config
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Save the effective line height and viewport as defaults in the user config
    #[arg(long)]
    save: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SourceArg {
    Editor,
    Preview,
}

impl From<SourceArg> for Pane {
    fn from(arg: SourceArg) -> Self {
        match arg {
            SourceArg::Editor => Pane::Editor,
            SourceArg::Preview => Pane::Preview,
        }
    }
}

#[derive(Debug, Serialize)]
struct Mapping {
    from: Pane,
    source_y: f32,
    target_y: f32,
    frames: usize,
}

#[derive(Debug, Serialize)]
struct Report<'a> {
    blocks: usize,
    extents: PaneExtents,
    editor_to_preview: &'a AnchorTable,
    preview_to_editor: &'a AnchorTable,
    #[serde(skip_serializing_if = "Option::is_none")]
    mapping: Option<Mapping>,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{}", err);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut settings = match &cli.config {
        Some(path) => load_config_from(path)?,
        None => load_config(),
    };
    apply_overrides(&mut settings, &cli);
    if cli.save {
        save_config(&settings)?;
    }

    let text = fs::read_to_string(&cli.file).map_err(|source| Error::FileRead {
        path: cli.file.clone(),
        source,
    })?;
    let blocks = extract_anchor_blocks(&text);
    info!("Laid out {} with {} blocks", cli.file.display(), blocks.len());
    let block_count = blocks.len();

    let editor = Rc::new(RefCell::new(EditorLayout::new(
        &text,
        settings.editor_line_height,
        settings.editor_viewport_height,
    )));
    let preview = Rc::new(RefCell::new(PreviewLayout::new(
        blocks,
        settings.preview_viewport_height,
    )));

    let mut sync = SyncScheduler::new(settings);
    // The one-shot mapping ignores the persisted sync toggle
    sync.set_enabled(true);
    sync.attach_editor(Box::new(editor.clone()));
    sync.attach_preview(Box::new(preview.clone()));
    sync.on_buffer_ready(Box::new(editor.clone()), None);
    sync.run_frame();

    let mapping = cli.at.map(|y| {
        let from = Pane::from(cli.from);
        match from {
            Pane::Editor => editor.borrow_mut().set_scroll_top(y),
            Pane::Preview => preview.borrow_mut().set_scroll_top(y),
        }
        sync.on_scroll(from);

        let mut frames = 0;
        while sync.needs_frame() && frames < MAX_FRAMES {
            sync.run_frame();
            frames += 1;
        }
        debug!("Mapping settled after {} frames", frames);

        let editor_y = editor.borrow().scroll_top();
        let preview_y = preview.borrow().scroll_top();
        let (source_y, target_y) = match from {
            Pane::Editor => (editor_y, preview_y),
            Pane::Preview => (preview_y, editor_y),
        };
        Mapping {
            from,
            source_y,
            target_y,
            frames,
        }
    });

    let report = Report {
        blocks: block_count,
        extents: sync.extents(),
        editor_to_preview: sync.table(Pane::Editor),
        preview_to_editor: sync.table(Pane::Preview),
        mapping,
    };

    let stdout = io::stdout();
    let mut out = stdout.lock();
    if cli.json {
        let json = serde_json::to_string_pretty(&report)
            .map_err(|e| Error::Application(format!("Failed to encode report: {}", e)))?;
        writeln!(out, "{}", json)?;
    } else {
        write_text(&mut out, &report)?;
    }
    Ok(())
}

/// Command-line geometry wins over the config file.
fn apply_overrides(settings: &mut SyncSettings, cli: &Cli) {
    if let Some(line_height) = cli.line_height {
        settings.editor_line_height = line_height;
    }
    if let Some(viewport) = cli.viewport {
        settings.editor_viewport_height = viewport;
        settings.preview_viewport_height = viewport;
    }
    settings.sanitize();
}

fn write_text(out: &mut impl Write, report: &Report<'_>) -> io::Result<()> {
    writeln!(out, "blocks: {}", report.blocks)?;
    writeln!(
        out,
        "scrollable: editor {:.1}px, preview {:.1}px",
        report.extents.editor.max_scrollable, report.extents.preview.max_scrollable
    )?;

    for (title, table) in [
        ("editor → preview", report.editor_to_preview),
        ("preview → editor", report.preview_to_editor),
    ] {
        writeln!(out)?;
        writeln!(out, "{} ({} anchors)", title, table.len())?;
        for anchor in table.iter() {
            writeln!(out, "  {:>10.1} → {:>10.1}", anchor.source_y, anchor.target_y)?;
        }
    }

    if let Some(mapping) = &report.mapping {
        writeln!(out)?;
        writeln!(
            out,
            "{} {:.1} → {} {:.1} ({} frames)",
            mapping.from.label(),
            mapping.source_y,
            mapping.from.other().label(),
            mapping.target_y,
            mapping.frames
        )?;
    }
    Ok(())
}
