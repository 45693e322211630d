//! Filter-chain and preset configuration.
//!
//! All settings are plain owned value types; they are validated eagerly
//! and only converted into the engine's filter structures at handle
//! creation time.  Nothing here holds engine state.

use crate::error::{Result, XzError};

/// Default preset level used when none is given.
pub const PRESET_DEFAULT: u32 = 6;
/// OR this flag into a preset level for the slower "extreme" variants.
pub const PRESET_EXTREME: u32 = 1 << 31;
/// Maximum number of filters in a chain (liblzma limit).
pub const FILTERS_MAX: usize = 4;

/// LZMA1/LZMA2 match finder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchFinder {
    HashChain3,
    HashChain4,
    BinaryTree2,
    BinaryTree3,
    BinaryTree4,
}

/// LZMA1/LZMA2 compression mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Fast,
    Normal,
}

/// Options for the LZMA1/LZMA2 filters.
///
/// Starts from a preset and overrides individual knobs, mirroring how
/// `lzma_lzma_preset` is used: unset fields keep the preset's value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LzmaFilterOptions {
    pub preset: u32,
    pub dict_size: Option<u32>,
    pub lc: Option<u32>,
    pub lp: Option<u32>,
    pub pb: Option<u32>,
    pub mode: Option<Mode>,
    pub nice_len: Option<u32>,
    pub match_finder: Option<MatchFinder>,
    pub depth: Option<u32>,
}

impl Default for LzmaFilterOptions {
    fn default() -> Self {
        Self::new(PRESET_DEFAULT)
    }
}

impl LzmaFilterOptions {
    pub fn new(preset: u32) -> Self {
        Self {
            preset,
            dict_size: None,
            lc: None,
            lp: None,
            pb: None,
            mode: None,
            nice_len: None,
            match_finder: None,
            depth: None,
        }
    }

    pub fn dict_size(mut self, size: u32) -> Self {
        self.dict_size = Some(size);
        self
    }

    pub fn lc(mut self, bits: u32) -> Self {
        self.lc = Some(bits);
        self
    }

    pub fn lp(mut self, bits: u32) -> Self {
        self.lp = Some(bits);
        self
    }

    pub fn pb(mut self, bits: u32) -> Self {
        self.pb = Some(bits);
        self
    }

    pub fn mode(mut self, mode: Mode) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn nice_len(mut self, len: u32) -> Self {
        self.nice_len = Some(len);
        self
    }

    pub fn match_finder(mut self, mf: MatchFinder) -> Self {
        self.match_finder = Some(mf);
        self
    }

    pub fn depth(mut self, depth: u32) -> Self {
        self.depth = Some(depth);
        self
    }

    pub(crate) fn engine_options(self) -> Result<xz2::stream::LzmaOptions> {
        validate_preset(self.preset)?;
        let mut opts = xz2::stream::LzmaOptions::new_preset(self.preset)?;
        if let Some(v) = self.dict_size {
            opts.dict_size(v);
        }
        if let Some(v) = self.lc {
            opts.literal_context_bits(v);
        }
        if let Some(v) = self.lp {
            opts.literal_position_bits(v);
        }
        if let Some(v) = self.pb {
            opts.position_bits(v);
        }
        if let Some(v) = self.mode {
            opts.mode(match v {
                Mode::Fast => xz2::stream::Mode::Fast,
                Mode::Normal => xz2::stream::Mode::Normal,
            });
        }
        if let Some(v) = self.nice_len {
            opts.nice_len(v);
        }
        if let Some(v) = self.match_finder {
            opts.match_finder(match v {
                MatchFinder::HashChain3 => xz2::stream::MatchFinder::HashChain3,
                MatchFinder::HashChain4 => xz2::stream::MatchFinder::HashChain4,
                MatchFinder::BinaryTree2 => xz2::stream::MatchFinder::BinaryTree2,
                MatchFinder::BinaryTree3 => xz2::stream::MatchFinder::BinaryTree3,
                MatchFinder::BinaryTree4 => xz2::stream::MatchFinder::BinaryTree4,
            });
        }
        if let Some(v) = self.depth {
            opts.depth(v);
        }
        Ok(opts)
    }
}

/// One filter in a chain.
///
/// The BCJ filters are pure byte transforms; a chain must end with
/// exactly one LZMA1 or LZMA2 entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Filter {
    Lzma1(LzmaFilterOptions),
    Lzma2(LzmaFilterOptions),
    X86,
    PowerPc,
    Ia64,
    Arm,
    ArmThumb,
    Sparc,
}

impl Filter {
    fn is_lzma(&self) -> bool {
        matches!(self, Filter::Lzma1(_) | Filter::Lzma2(_))
    }
}

/// Ordered filter chain for raw and custom XZ encoding.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FilterChain {
    filters: Vec<Filter>,
}

impl FilterChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    /// Structural validation, performed before any engine handle exists.
    pub(crate) fn validate(&self) -> Result<()> {
        if self.filters.is_empty() {
            return Err(XzError::InvalidOptions("filter chain is empty".into()));
        }
        if self.filters.len() > FILTERS_MAX {
            return Err(XzError::InvalidOptions(format!(
                "filter chain has {} entries, maximum is {FILTERS_MAX}",
                self.filters.len()
            )));
        }
        let lzma_count = self.filters.iter().filter(|f| f.is_lzma()).count();
        if lzma_count != 1 || !self.filters.last().map_or(false, Filter::is_lzma) {
            return Err(XzError::InvalidOptions(
                "filter chain must end with exactly one LZMA1/LZMA2 filter".into(),
            ));
        }
        Ok(())
    }

    pub(crate) fn to_engine(&self) -> Result<xz2::stream::Filters> {
        self.validate()?;
        let mut out = xz2::stream::Filters::new();
        for filter in &self.filters {
            match filter {
                Filter::Lzma1(opts) => {
                    out.lzma1(&opts.engine_options()?);
                }
                Filter::Lzma2(opts) => {
                    out.lzma2(&opts.engine_options()?);
                }
                Filter::X86 => {
                    out.x86();
                }
                Filter::PowerPc => {
                    out.powerpc();
                }
                Filter::Ia64 => {
                    out.ia64();
                }
                Filter::Arm => {
                    out.arm();
                }
                Filter::ArmThumb => {
                    out.arm_thumb();
                }
                Filter::Sparc => {
                    out.sparc();
                }
            }
        }
        Ok(out)
    }
}

/// Reject out-of-range presets before the engine sees them.
pub(crate) fn validate_preset(preset: u32) -> Result<()> {
    if preset & !PRESET_EXTREME > 9 {
        return Err(XzError::InvalidOptions(format!(
            "preset level {} out of range 0-9",
            preset & !PRESET_EXTREME
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_must_end_with_lzma() {
        let chain = FilterChain::new().push(Filter::Lzma2(LzmaFilterOptions::default()));
        assert!(chain.validate().is_ok());

        let chain = FilterChain::new()
            .push(Filter::Lzma2(LzmaFilterOptions::default()))
            .push(Filter::X86);
        assert!(matches!(chain.validate(), Err(XzError::InvalidOptions(_))));

        let chain = FilterChain::new().push(Filter::X86);
        assert!(matches!(chain.validate(), Err(XzError::InvalidOptions(_))));
    }

    #[test]
    fn empty_and_oversized_chains_rejected() {
        assert!(FilterChain::new().validate().is_err());

        let mut chain = FilterChain::new();
        for _ in 0..FILTERS_MAX {
            chain = chain.push(Filter::X86);
        }
        chain = chain.push(Filter::Lzma2(LzmaFilterOptions::default()));
        assert!(matches!(chain.validate(), Err(XzError::InvalidOptions(_))));
    }

    #[test]
    fn preset_range() {
        assert!(validate_preset(0).is_ok());
        assert!(validate_preset(9).is_ok());
        assert!(validate_preset(9 | PRESET_EXTREME).is_ok());
        assert!(validate_preset(10).is_err());
    }
}
