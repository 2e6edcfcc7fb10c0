use anyhow::{anyhow, bail, Context, Result};
use classb_pctest::{PlacementTable, ProbeId};
use goblin::elf::header::EM_ARM;
use goblin::elf::sym::STT_FUNC;
use goblin::elf::Elf;
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

/// A symbol as found in the ELF symbol table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawSymbol<'a> {
    pub name: &'a str,
    pub value: u64,
    pub is_function: bool,
    pub section: Option<&'a str>,
}

/// Reads the addresses the linker gave the three probe routines.
pub fn probe_addresses(path: &Path) -> Result<PlacementTable> {
    let buffer = fs::read(path).with_context(|| format!("Failed to read ELF file: {:?}", path))?;

    let elf = Elf::parse(&buffer).context("Failed to parse ELF binary")?;

    let thumb = elf.header.e_machine == EM_ARM;
    debug!("ELF machine {:#x}, thumb={}", elf.header.e_machine, thumb);

    let symbols = elf.syms.iter().filter_map(|sym| {
        let name = elf.strtab.get_at(sym.st_name)?;
        let section = elf
            .section_headers
            .get(sym.st_shndx)
            .and_then(|sh| elf.shdr_strtab.get_at(sh.sh_name));
        Some(RawSymbol {
            name,
            value: sym.st_value,
            is_function: sym.st_type() == STT_FUNC,
            section,
        })
    });

    let table = resolve_probe_symbols(symbols, thumb)?;
    info!(
        "Linked probe addresses: {:#x}, {:#x}, {:#x}",
        table.expected(ProbeId::One),
        table.expected(ProbeId::Two),
        table.expected(ProbeId::Three)
    );
    Ok(table)
}

/// Picks the probe symbols out of a symbol table and builds the table the
/// linker actually produced.
pub fn resolve_probe_symbols<'a, I>(symbols: I, thumb: bool) -> Result<PlacementTable>
where
    I: IntoIterator<Item = RawSymbol<'a>>,
{
    let mut found: [Option<u64>; 3] = [None; 3];

    for sym in symbols {
        let Some(id) = ProbeId::from_symbol(sym.name) else {
            continue;
        };

        let mut value = sym.value;
        if thumb && sym.is_function {
            value &= !1;
        }

        match sym.section {
            Some(section) if section != id.section() => {
                warn!(
                    "{} lives in {} rather than {}; placement is up to the default linker script",
                    sym.name,
                    section,
                    id.section()
                );
            }
            _ => {}
        }

        let slot = &mut found[id.index()];
        if let Some(previous) = *slot {
            if previous != value {
                bail!(
                    "Symbol {} defined twice ({:#x} and {:#x})",
                    sym.name,
                    previous,
                    value
                );
            }
        }
        *slot = Some(value);
    }

    let mut addresses = [0usize; 3];
    for id in ProbeId::ALL {
        let value = found[id.index()]
            .ok_or_else(|| anyhow!("Probe symbol {} not found in ELF", id.symbol()))?;
        addresses[id.index()] = usize::try_from(value)
            .with_context(|| format!("{} address {:#x} does not fit", id.symbol(), value))?;
    }

    Ok(PlacementTable::new(addresses))
}
