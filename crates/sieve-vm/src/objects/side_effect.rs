//! Action side effects

/// Modifiers collected for one action before it is added to the result
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActionOptions {
    /// Keep the implicit keep alive
    pub copy: bool,
}

pub trait SideEffect: Send + Sync {
    fn identifier(&self) -> &'static str;

    /// Code within the owning extension
    fn code(&self) -> u8;

    fn apply(&self, options: &mut ActionOptions);
}

pub const SIDE_EFFECT_COPY: u8 = 0;

/// `:copy`
#[derive(Debug)]
pub struct CopyEffect;

pub static COPY: CopyEffect = CopyEffect;

impl SideEffect for CopyEffect {
    fn identifier(&self) -> &'static str {
        "copy"
    }

    fn code(&self) -> u8 {
        SIDE_EFFECT_COPY
    }

    fn apply(&self, options: &mut ActionOptions) {
        options.copy = true;
    }
}
