use serde::Serialize;
use stackfleet_core::{FleetResult, LifecycleOutcome};

pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    println!("{}", json);
    Ok(())
}

/// Failed stacks as a table on stderr, so stdout stays the report stream.
pub fn print_failures(result: &FleetResult) {
    let rows: Vec<Vec<String>> = result
        .failures()
        .filter_map(|report| match &report.outcome {
            LifecycleOutcome::Failed { stage, cause } => Some(vec![
                report.stack.to_string(),
                stage.to_string(),
                cause.lines().next().unwrap_or_default().to_string(),
            ]),
            LifecycleOutcome::Succeeded { .. } => None,
        })
        .collect();
    if rows.is_empty() {
        return;
    }
    eprint!("{}", render_table(&["STACK", "STAGE", "CAUSE"], &rows));
}

fn render_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            if i < widths.len() {
                widths[i] = widths[i].max(cell.len());
            }
        }
    }

    let render_row = |cells: Vec<&str>| -> String {
        cells
            .iter()
            .enumerate()
            .map(|(i, cell)| {
                let w = widths.get(i).copied().unwrap_or(0);
                format!("{:width$}", cell, width = w)
            })
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    };

    let mut out = String::new();
    out.push_str(&render_row(headers.to_vec()));
    out.push('\n');
    let sep: Vec<String> = widths.iter().map(|&w| "-".repeat(w)).collect();
    out.push_str(&sep.join("  "));
    out.push('\n');
    for row in rows {
        out.push_str(&render_row(row.iter().map(String::as_str).collect()));
        out.push('\n');
    }
    out
}
