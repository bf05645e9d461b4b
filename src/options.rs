//! Compiler options.

/// Stack limit listed by default, in bytes.
pub const DEFAULT_STACK_MAX: u32 = 64 * 1024;

/// What the driver prints and how the backend is configured.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Options {
    /// Print the token stream.
    pub dump_tokens: bool,
    /// Print the checked tree.
    pub dump_ast: bool,
    /// Print the lowered modules.
    pub dump_ir: bool,
    /// Log filter directive, such as `debug`.
    pub log_level: Option<String>,
    /// Value of the stack limit global.
    pub stack_max: u32,
}

impl Default for Options {
    fn default() -> Options {
        Options {
            dump_tokens: false,
            dump_ast: false,
            dump_ir: false,
            log_level: None,
            stack_max: DEFAULT_STACK_MAX,
        }
    }
}
