pub mod formatter;
pub mod report;
pub mod writer;

pub use formatter::{
    format_batch_summary, format_distribution, format_number, format_template_list,
    quarantine_warnings, should_use_colors, TemplateEntry,
};
pub use report::{BatchReport, DistributionReport};
pub use writer::{output_file_name, write_outcome, write_table, OutputFormat};
