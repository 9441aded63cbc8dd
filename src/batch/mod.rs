pub mod compact;
pub mod processor;
pub mod table;

pub use compact::{compact_table, plan_compaction, CompactPlan};
pub use processor::{
    check_split_column, parse_divisions, parse_total, process_table, resolve_columns, split_cell,
    BatchOptions, BatchOutcome, ColumnShape, QuarantinedRow, ResolvedColumn, MAX_DIVISIONS,
    REASON_COLUMN,
};
pub use table::{read_csv, read_table, read_workbook, Table};
