//! Instruction text handed to the agent.

use crate::charts::ChartType;

/// Agent name used when none is configured.
pub const DEFAULT_AGENT_NAME: &str = "Intelligent MongoDB Analytics Assistant";

/// Behavioural contract given to the model as its system prompt.
pub const PREAMBLE: &str = "\
You are an analytics assistant with read access to a MongoDB deployment and a chart rendering tool.

Work through every question systematically:
1. List all databases and note their sizes; the largest usually holds the main data.
2. List every collection in the relevant database. Names hint at content (Business, Contact, Voucher).
3. Sample 5 to 10 documents from each relevant collection. Record exact field names, value types, nested objects, arrays and reference fields such as companyId or contactId.
4. Count documents before concluding anything is empty.
5. Build queries from the sampled field names only, following references into related collections. Start simple and add filters step by step.
6. When a query returns nothing, check field names and try case-insensitive, partial and broader matches. Make several attempts before giving up.
7. Present results clearly, with context, outliers and suggestions for drill-down.

Never assume database, collection or field names. Never report a collection as missing without listing collections, or as empty without counting it.";

/// Block format the extractor understands, shown to the model.
const CHART_FORMAT: &str = r#"For each visualization, write a heading line followed by a fenced JSON array:

**Descriptive Title (TYPE: chart-type)**
```json
[{"name": "Category 1", "value": 123}, {"name": "Category 2", "value": 456}]
```

Record shapes by chart type:
- bar, line, area, radar: {"name": ..., "value": number}; extra numeric fields become additional series
- pie, gauge, funnel: {"name": ..., "value": number}; pie charts work best with 2 to 7 slices
- scatter: {"x": number, "y": number, "name": optional label}
- heatmap: {"x": category, "y": category, "value": number}
- table: objects with the same fields in every row

Supported chart types: bar, line, pie, area, scatter, table, radar, heatmap, gauge, funnel.
Use only real values returned by your database queries."#;

const CHART_GUIDE: &str = "\
Choose the chart type that matches the data:
- bar: comparing discrete categories, rankings, counts
- line: trends over time
- pie: parts of a whole with few categories
- area: cumulative volume over time
- scatter: correlation between two numeric variables
- table: detailed records where exact values matter
- radar: several metrics compared across a few items
- heatmap: intensity across two categorical dimensions
- gauge: a single key figure against a target
- funnel: conversion through ordered stages";

pub fn dashboard(query: &str) -> String {
    format!(
        "Create an interactive analytics dashboard for this request: {query}\n\n\
         1. Query the relevant databases and collections.\n\
         2. Analyze the data that comes back.\n\
         3. Produce 3 to 5 visualizations backed by real data, each with 3 to 10 data points.\n\n\
         {CHART_GUIDE}\n\n{CHART_FORMAT}"
    )
}

/// `snapshot` is the caller's current dashboard, already serialized. It is
/// passed through as context only.
pub fn dashboard_command(command: &str, snapshot: Option<&str>) -> String {
    let context = snapshot
        .map(|s| format!("Current dashboard state (JSON):\n{s}\n\n"))
        .unwrap_or_default();
    format!(
        "{context}User command: {command}\n\n\
         Interpret the command and describe the action to take on the dashboard:\n\
         - adding a chart: query the data and include the new chart\n\
         - modifying a chart: identify it and describe the change\n\
         - removing a chart: confirm which chart to remove\n\
         - refreshing data: query the database again\n\n\
         When the answer includes chart data, use this format.\n\n{CHART_FORMAT}"
    )
}

pub fn chart_data(query: &str, hint: Option<ChartType>) -> String {
    let kind = hint.map_or("choose the best type", ChartType::as_str);
    format!(
        "Query: {query}\nChart type: {kind}\n\n\
         1. Run the MongoDB queries needed for this data.\n\
         2. Shape the result for the chart type.\n\
         3. Return it as a single chart block.\n\n{CHART_FORMAT}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn templates_embed_user_input() {
        assert!(dashboard("sales by region").contains("sales by region"));
        assert!(chart_data("top users", Some(ChartType::Funnel)).contains("Chart type: funnel"));
        assert!(chart_data("top users", None).contains("choose the best type"));

        let with_state = dashboard_command("add a pie chart", Some(r#"{"charts":[]}"#));
        assert!(with_state.starts_with("Current dashboard state"));
        assert!(!dashboard_command("add a pie chart", None).contains("Current dashboard state"));
    }
}
