//! Table formatting utilities for structured output.

use comfy_table::{Attribute, Cell, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};

use crate::client::EmbeddingSearchResult;
use crate::vector::{EmbeddingIndex, RepoEmbeddingIndex};

/// Builder for creating formatted tables.
pub struct TableBuilder {
    table: Table,
}

impl Default for TableBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TableBuilder {
    /// Create a new table builder.
    pub fn new() -> Self {
        let mut table = Table::new();
        table.load_preset(UTF8_FULL);
        table.apply_modifier(UTF8_ROUND_CORNERS);
        Self { table }
    }

    /// Set the table headers.
    pub fn set_headers(mut self, headers: Vec<&str>) -> Self {
        let header_cells: Vec<Cell> = headers
            .into_iter()
            .map(|h| Cell::new(h).add_attribute(Attribute::Bold))
            .collect();
        self.table.set_header(header_cells);
        self
    }

    /// Add a row to the table.
    pub fn add_row(mut self, row: Vec<String>) -> Self {
        self.table.add_row(row);
        self
    }

    /// Build and return the formatted table.
    pub fn build(self) -> String {
        self.table.to_string()
    }
}

/// Summary of both halves of a repository index.
pub fn create_index_summary_table(index: &RepoEmbeddingIndex) -> String {
    let mut builder = TableBuilder::new().set_headers(vec![
        "Index",
        "Rows",
        "Dimension",
        "Quantized bytes",
        "Ranks",
        "Files",
    ]);
    for (name, half) in [("code", &index.code_index), ("text", &index.text_index)] {
        builder = builder.add_row(summary_row(name, half));
    }
    format!(
        "{} @ {}\n{}",
        index.repo_name,
        index.revision,
        builder.build()
    )
}

fn summary_row(name: &str, index: &EmbeddingIndex) -> Vec<String> {
    let mut files: Vec<&str> = index
        .row_metadata
        .iter()
        .map(|row| row.file_name.as_str())
        .collect();
    files.sort_unstable();
    files.dedup();

    vec![
        name.to_string(),
        index.rows().to_string(),
        index.column_dimension.to_string(),
        index.embeddings.len().to_string(),
        if index.ranks.is_empty() {
            "no".to_string()
        } else {
            "yes".to_string()
        },
        files.len().to_string(),
    ]
}

/// Ranked search results of one kind.
pub fn create_results_table(kind: &str, results: &[EmbeddingSearchResult]) -> String {
    let mut builder = TableBuilder::new().set_headers(vec![kind, "Score", "File", "Lines"]);
    for (rank, result) in results.iter().enumerate() {
        builder = builder.add_row(vec![
            (rank + 1).to_string(),
            format!("{:.4}", result.score),
            result.row_metadata.file_name.clone(),
            format!(
                "{}-{}",
                result.row_metadata.start_line, result.row_metadata.end_line
            ),
        ]);
    }
    builder.build()
}
