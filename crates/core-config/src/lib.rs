//! Configuration loading and parsing.
//!
//! Parses `hexcmp.toml` (or an override path provided by the binary). Every
//! field is optional; missing sections take defaults and unknown fields are
//! ignored so older binaries tolerate newer files. A file that fails to parse
//! falls back to defaults with a warning.
//!
//! Window capacity (bytes per page for each file pane) is not a file setting:
//! it is derived from terminal geometry in [`Config::apply_context`], which
//! also clamps the configured line width to what the terminal can show.

use anyhow::Result;
use serde::Deserialize;
use std::{fs, path::PathBuf};
use tracing::{info, warn};

/// Columns used by the offset gutter plus separators around the hex and ASCII columns.
pub const GUTTER_COLUMNS: u16 = 12;
/// Columns per byte: two hex digits, one space, one ASCII cell.
pub const COLUMNS_PER_BYTE: u16 = 4;
/// Smallest chunk size accepted for any chunked loop.
pub const MIN_CHUNK: usize = 4096;

const MIB: usize = 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigContext {
    pub viewport_columns: u16,
    pub viewport_rows: u16,
    pub status_rows: u16,
    pub prompt_rows: u16,
    pub two_files: bool,
}

impl ConfigContext {
    pub fn new(
        viewport_columns: u16,
        viewport_rows: u16,
        status_rows: u16,
        prompt_rows: u16,
        two_files: bool,
    ) -> Self {
        Self {
            viewport_columns,
            viewport_rows,
            status_rows,
            prompt_rows,
            two_files,
        }
    }

    /// Data rows available to each file pane. Every pane has its own status row;
    /// with two panes an odd remainder becomes a spacer line between them.
    pub fn rows_per_file(&self) -> u16 {
        let panes = if self.two_files { 2 } else { 1 };
        let reserved = self
            .prompt_rows
            .saturating_add(self.status_rows.saturating_mul(panes));
        let rows = self.viewport_rows.saturating_sub(reserved);
        if self.two_files { rows / 2 } else { rows }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ViewConfig {
    #[serde(default = "ViewConfig::default_line_width")]
    pub line_width: usize,
    /// Lines kept above a search hit so it is not on the topmost row.
    #[serde(default = "ViewConfig::default_lead_in_lines")]
    pub lead_in_lines: usize,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            line_width: Self::default_line_width(),
            lead_in_lines: Self::default_lead_in_lines(),
        }
    }
}

impl ViewConfig {
    const fn default_line_width() -> usize {
        16
    }
    const fn default_lead_in_lines() -> usize {
        3
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    #[serde(default = "SearchConfig::default_forward_chunk")]
    pub forward_chunk: usize,
    #[serde(default = "SearchConfig::default_backward_chunk")]
    pub backward_chunk: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            forward_chunk: Self::default_forward_chunk(),
            backward_chunk: Self::default_backward_chunk(),
        }
    }
}

impl SearchConfig {
    const fn default_forward_chunk() -> usize {
        MIB
    }
    const fn default_backward_chunk() -> usize {
        8 * MIB
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DiffConfig {
    #[serde(default = "DiffConfig::default_speedup_chunk")]
    pub speedup_chunk: usize,
}

impl Default for DiffConfig {
    fn default() -> Self {
        Self {
            speedup_chunk: Self::default_speedup_chunk(),
        }
    }
}

impl DiffConfig {
    const fn default_speedup_chunk() -> usize {
        32 * MIB
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ScrollConfig {
    /// Pages read per block while compacting.
    #[serde(default = "ScrollConfig::default_block_pages")]
    pub block_pages: usize,
}

impl Default for ScrollConfig {
    fn default() -> Self {
        Self {
            block_pages: Self::default_block_pages(),
        }
    }
}

impl ScrollConfig {
    const fn default_block_pages() -> usize {
        1000
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SpliceConfig {
    #[serde(default = "SpliceConfig::default_chunk_size")]
    pub chunk_size: usize,
    /// Tail shifts larger than this many bytes ask for confirmation first.
    #[serde(default = "SpliceConfig::default_confirm_threshold")]
    pub confirm_threshold: u64,
    /// Number of progress ticks shown across one commit.
    #[serde(default = "SpliceConfig::default_progress_resolution")]
    pub progress_resolution: u32,
}

impl Default for SpliceConfig {
    fn default() -> Self {
        Self {
            chunk_size: Self::default_chunk_size(),
            confirm_threshold: Self::default_confirm_threshold(),
            progress_resolution: Self::default_progress_resolution(),
        }
    }
}

impl SpliceConfig {
    const fn default_chunk_size() -> usize {
        16 * MIB
    }
    const fn default_confirm_threshold() -> u64 {
        64 * MIB as u64
    }
    const fn default_progress_resolution() -> u32 {
        50
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct ConfigFile {
    #[serde(default)]
    pub view: ViewConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub diff: DiffConfig,
    #[serde(default)]
    pub scroll: ScrollConfig,
    #[serde(default)]
    pub splice: SpliceConfig,
}

impl ConfigFile {
    /// Replace out-of-range values with usable ones.
    fn sanitize(&mut self) {
        if self.view.line_width == 0 {
            self.view.line_width = ViewConfig::default_line_width();
        }
        self.search.forward_chunk = self.search.forward_chunk.max(MIN_CHUNK);
        self.search.backward_chunk = self.search.backward_chunk.max(MIN_CHUNK);
        self.diff.speedup_chunk = self.diff.speedup_chunk.max(MIN_CHUNK);
        self.splice.chunk_size = self.splice.chunk_size.max(MIN_CHUNK);
        self.scroll.block_pages = self.scroll.block_pages.max(1);
        self.splice.progress_resolution = self.splice.progress_resolution.max(1);
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub file: ConfigFile,
    pub effective_line_width: usize,
    pub window_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        let file = ConfigFile::default();
        let width = file.view.line_width;
        Self {
            file,
            effective_line_width: width,
            window_capacity: width * 16,
        }
    }
}

/// Best-effort config path: working directory first, then the platform config dir.
pub fn discover() -> PathBuf {
    let local = PathBuf::from("hexcmp.toml");
    if local.exists() {
        return local;
    }
    if let Some(dir) = dirs::config_dir() {
        return dir.join("hexcmp").join("hexcmp.toml");
    }
    PathBuf::from("hexcmp.toml")
}

pub fn load_from(path: Option<PathBuf>) -> Result<Config> {
    let path = path.unwrap_or_else(discover);
    let Ok(content) = fs::read_to_string(&path) else {
        return Ok(Config::default());
    };
    match toml::from_str::<ConfigFile>(&content) {
        Ok(mut file) => {
            file.sanitize();
            let width = file.view.line_width;
            Ok(Config {
                file,
                effective_line_width: width,
                window_capacity: width * 16, // recomputed by apply_context
            })
        }
        Err(e) => {
            warn!(target: "config", path = %path.display(), error = %e, "config_parse_failed_using_defaults");
            Ok(Config::default())
        }
    }
}

impl Config {
    /// Apply terminal geometry: clamp the line width to the columns available and
    /// derive the per-pane window capacity. Returns the capacity in bytes.
    pub fn apply_context(&mut self, ctx: ConfigContext) -> usize {
        let raw = self.file.view.line_width;
        let width = if ctx.viewport_columns == 0 {
            raw
        } else {
            let fit = usize::from(ctx.viewport_columns.saturating_sub(GUTTER_COLUMNS))
                / usize::from(COLUMNS_PER_BYTE);
            // Keep widths on a multiple of 8 so raster marks line up.
            let fit = (fit / 8 * 8).max(8);
            raw.min(fit)
        };
        if width != raw {
            info!(
                target: "config",
                raw,
                clamped = width,
                columns = ctx.viewport_columns,
                "line_width_clamped"
            );
        }
        let rows = usize::from(ctx.rows_per_file().max(1));
        self.effective_line_width = width;
        self.window_capacity = rows * width;
        self.window_capacity
    }

    /// Recompute after a terminal resize. Returns `Some(capacity)` when the
    /// capacity or the line width changed, so windows must be rebuilt.
    pub fn recompute_with_context(&mut self, ctx: ConfigContext) -> Option<usize> {
        let prev = (self.window_capacity, self.effective_line_width);
        let current = self.apply_context(ctx);
        (prev != (current, self.effective_line_width)).then_some(current)
    }

    /// Bytes kept above a search hit.
    pub fn search_lead_in(&self) -> u64 {
        (self.file.view.lead_in_lines * self.effective_line_width) as u64
    }
}
