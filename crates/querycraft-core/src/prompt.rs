use querycraft_types::DatabaseSchema;

/// Builds the prompt for one case: where the database lives, what tables it
/// has, the question, and how to answer.
pub fn build_prompt(database: &DatabaseSchema, question: &str) -> String {
    let mut prompt = format!(
        "You have access to a {} database at {}.\n\n",
        database.engine, database.path
    );

    if !database.tables.is_empty() {
        prompt.push_str("Tables:\n");
        for table in &database.tables {
            prompt.push_str(&format!("- {} ({})\n", table.name, table.columns.join(", ")));
        }
        prompt.push('\n');
    }

    prompt.push_str("Query the database and answer this question:\n\n");
    prompt.push_str(question.trim());
    prompt.push_str("\n\nShow your SQL queries and provide a clear answer.");
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use querycraft_types::TableSchema;

    #[test]
    fn test_prompt_embeds_schema_and_question() {
        let prompt = build_prompt(&DatabaseSchema::default(), "How many startups raised a Series A?");
        assert!(prompt.starts_with("You have access to a SQLite database at data/startup-funding.db."));
        assert!(prompt.contains("- funding_rounds (id, startup_id, stage, amount_usd, funding_date, lead_investor_id, valuation_usd, announced)"));
        assert!(prompt.contains("How many startups raised a Series A?"));
        assert!(prompt.ends_with("provide a clear answer."));
    }

    #[test]
    fn test_prompt_without_tables() {
        let db = DatabaseSchema {
            engine: "DuckDB".to_string(),
            path: "warehouse.duckdb".to_string(),
            tables: Vec::new(),
        };
        let prompt = build_prompt(&db, "  Total revenue?\n");
        assert!(!prompt.contains("Tables:"));
        assert!(prompt.contains("DuckDB database at warehouse.duckdb"));
        assert!(prompt.contains("question:\n\nTotal revenue?\n\n"));
    }

    #[test]
    fn test_custom_table() {
        let db = DatabaseSchema {
            tables: vec![TableSchema::new("deals", &["id", "value"])],
            ..DatabaseSchema::default()
        };
        assert!(build_prompt(&db, "q").contains("- deals (id, value)\n"));
    }
}
