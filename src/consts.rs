pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Reserved name resolving to the coordinates pseudo-attribute.
pub const COORDS_NAME: &str = "__coords";

/// Wire sentinel marking a variable number of values per cell.
pub const VAR_NUM: i32 = -1;

/// Byte width of the offset slot stored per cell of a variable-sized attribute.
pub const CELL_VAR_OFFSET_SIZE: u64 = 8;

/// Cells per tile of a sparse array with irregular tiles, unless overridden.
pub const DEFAULT_CAPACITY: u64 = 10_000;

pub const DEFAULT_CONSOLIDATION_STEP: u32 = 1;
