use anyhow::{Context, Result};
use classb_pctest::{FlashWindow, PlacementTable, ProbeId, SeparationError, WindowError};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::path::Path;

pub const SCHEMA_VERSION: &str = "1.0";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Unsupported schema_version '{0}'. Supported versions: '1.0'")]
    UnsupportedSchema(String),
    #[error("Chip 'name' cannot be empty")]
    EmptyChipName,
    #[error("Invalid flash size '{size}': {reason}")]
    InvalidSize { size: String, reason: String },
    #[error("Invalid flash window: {0}")]
    Window(#[from] WindowError),
    #[error("Expected exactly 3 probe addresses, found {0}")]
    ProbeCount(usize),
    #[error("Address {0:#x} does not fit the target address width")]
    AddressOutOfRange(u64),
    #[error("{probe} at {address:#x} lies outside the flash window")]
    ProbeOutsideWindow { probe: ProbeId, address: u64 },
    #[error("Probe placement is not bit-separated: {0}")]
    Separation(#[from] SeparationError),
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct FlashRange {
    pub base: u64,
    pub size: String, // e.g. "512 KiB"
}

fn default_alignment() -> u64 {
    4
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct ChipPlacement {
    pub name: String,
    pub flash: FlashRange,
    #[serde(default = "default_alignment")]
    pub alignment: u64,
}

/// Where the three PC test probes go on one chip.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct PlacementManifest {
    pub schema_version: String,
    pub chip: ChipPlacement,
    /// Explicit probe addresses; derived from the flash window when absent.
    #[serde(default)]
    pub probes: Option<Vec<u64>>,
}

impl PlacementManifest {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let f = std::fs::File::open(&path)
            .with_context(|| format!("Failed to open placement manifest at {:?}", path.as_ref()))?;
        let manifest: Self =
            serde_yaml::from_reader(f).context("Failed to parse Placement Manifest YAML")?;
        manifest.validate()?;
        tracing::debug!("Loaded placement manifest for {}", manifest.chip.name);
        Ok(manifest)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.schema_version != SCHEMA_VERSION {
            return Err(ConfigError::UnsupportedSchema(self.schema_version.clone()));
        }

        if self.chip.name.trim().is_empty() {
            return Err(ConfigError::EmptyChipName);
        }

        let window = self.window()?;
        let table = self.placement()?;
        table.check_separation(window.mask())?;

        Ok(())
    }

    pub fn window(&self) -> Result<FlashWindow, ConfigError> {
        let size = parse_size(&self.chip.flash.size).map_err(|e| ConfigError::InvalidSize {
            size: self.chip.flash.size.clone(),
            reason: e.to_string(),
        })?;

        Ok(FlashWindow::new(
            to_address(self.chip.flash.base)?,
            to_address(size)?,
            to_address(self.chip.alignment)?,
        )?)
    }

    /// The placement table this manifest describes. Does not run the
    /// separation check; `validate` does.
    pub fn placement(&self) -> Result<PlacementTable, ConfigError> {
        let window = self.window()?;
        let Some(probes) = &self.probes else {
            return Ok(PlacementTable::from_window(&window));
        };

        if probes.len() != ProbeId::ALL.len() {
            return Err(ConfigError::ProbeCount(probes.len()));
        }

        let mut addresses = [0; 3];
        for (id, &raw) in ProbeId::ALL.into_iter().zip(probes) {
            let address = to_address(raw)?;
            if !window.contains(address) {
                return Err(ConfigError::ProbeOutsideWindow {
                    probe: id,
                    address: raw,
                });
            }
            addresses[id.index()] = address;
        }

        Ok(PlacementTable::new(addresses))
    }
}

fn to_address(value: u64) -> Result<usize, ConfigError> {
    usize::try_from(value).map_err(|_| ConfigError::AddressOutOfRange(value))
}

pub fn parse_size(size_str: &str) -> Result<u64> {
    use human_size::{Byte, Size, SpecificSize};
    let s: Size = size_str
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid size format: {}", e))?;
    let bytes: SpecificSize<Byte> = s.into();
    Ok(bytes.value() as u64)
}

/// Linker script fragment pinning each probe section to its address.
///
/// Meant to be included after the target's memory layout; `INSERT AFTER`
/// keeps the default `.text` placement intact.
pub fn render_linker_script(chip: &str, table: &PlacementTable) -> String {
    let mut sections: Vec<_> = table.iter().collect();
    sections.sort_by_key(|&(_, address)| address);

    let mut out = String::new();
    let _ = writeln!(out, "/* PC test probe placement for {} */", chip);
    let _ = writeln!(out, "SECTIONS");
    let _ = writeln!(out, "{{");
    for (id, address) in sections {
        let _ = writeln!(
            out,
            "  {} {:#010X} : {{ KEEP(*({})) }}",
            id.section(),
            address,
            id.section()
        );
    }
    let _ = writeln!(out, "}}");
    let _ = writeln!(out, "INSERT AFTER .text;");
    out
}
