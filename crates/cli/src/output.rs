//! Output formatting for CLI

use clap::ValueEnum;
use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;
use std::io::{self, BufRead, Write};

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum OutputFormat {
    /// Human-readable table format
    #[default]
    Table,
    /// JSON format
    Json,
    /// YAML format
    Yaml,
    /// Plain text format
    Plain,
}

/// Trait for items that can be displayed in a table
pub trait TableDisplay {
    fn headers() -> Vec<&'static str>;
    fn row(&self) -> Vec<String>;
}

fn table(headers: Vec<&'static str>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(headers);
    table
}

/// Print a list of items
pub fn print_list<T: Serialize + TableDisplay>(
    out: &mut dyn Write,
    items: &[T],
    format: OutputFormat,
) -> anyhow::Result<()> {
    match format {
        OutputFormat::Table => {
            if items.is_empty() {
                writeln!(out, "No items found.")?;
                return Ok(());
            }
            let mut table = table(T::headers());
            for item in items {
                table.add_row(item.row());
            }
            writeln!(out, "{table}")?;
        }
        OutputFormat::Json => {
            writeln!(out, "{}", serde_json::to_string_pretty(items)?)?;
        }
        OutputFormat::Yaml => {
            write!(out, "{}", serde_yaml::to_string(items)?)?;
        }
        OutputFormat::Plain => {
            for item in items {
                writeln!(out, "{}", item.row().join("\t"))?;
            }
        }
    }
    Ok(())
}

/// Print a titled table, used for grouped output
pub fn print_section<T: TableDisplay>(out: &mut dyn Write, title: &str, items: &[T]) -> io::Result<()> {
    writeln!(out, "{}", title.bold())?;
    let mut table = table(T::headers());
    for item in items {
        table.add_row(item.row());
    }
    writeln!(out, "{table}")
}

/// Color one line of a unified diff
pub fn diff_line(line: &str) -> String {
    if line.starts_with("+++") || line.starts_with("---") {
        line.bold().to_string()
    } else if line.starts_with('+') {
        line.green().to_string()
    } else if line.starts_with('-') {
        line.red().to_string()
    } else if line.starts_with("@@") {
        line.cyan().to_string()
    } else {
        line.to_string()
    }
}

/// Ask a yes/no question until it is answered. End of input counts as no.
pub fn confirm(question: &str, input: &mut dyn BufRead, out: &mut dyn Write) -> io::Result<bool> {
    loop {
        write!(out, "{} [y/n] ", question)?;
        out.flush()?;

        let mut answer = String::new();
        if input.read_line(&mut answer)? == 0 {
            writeln!(out)?;
            return Ok(false);
        }
        match answer.trim().to_ascii_lowercase().as_str() {
            "y" | "yes" => return Ok(true),
            "n" | "no" => return Ok(false),
            _ => continue,
        }
    }
}

/// Print success message
pub fn print_success(out: &mut dyn Write, message: &str) -> io::Result<()> {
    writeln!(out, "✅ {}", message)
}

/// Print error message
pub fn print_error(message: &str) {
    eprintln!("❌ {}", message);
}

/// Print warning message
pub fn print_warning(out: &mut dyn Write, message: &str) -> io::Result<()> {
    writeln!(out, "⚠️  {}", message)
}

/// Print info message
pub fn print_info(out: &mut dyn Write, message: &str) -> io::Result<()> {
    writeln!(out, "ℹ️  {}", message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct Row {
        id: String,
    }

    impl TableDisplay for Row {
        fn headers() -> Vec<&'static str> {
            vec!["ID"]
        }

        fn row(&self) -> Vec<String> {
            vec![self.id.clone()]
        }
    }

    fn answer(input: &str) -> (bool, String) {
        let mut out = Vec::<u8>::new();
        let yes = confirm("Remove?", &mut input.as_bytes(), &mut out).unwrap();
        (yes, String::from_utf8(out).unwrap())
    }

    #[test]
    fn test_confirm_repeats_until_answered() {
        let (yes, out) = answer("maybe\n\nY\n");
        assert!(yes);
        assert_eq!(out.matches("Remove? [y/n]").count(), 3);
    }

    #[test]
    fn test_confirm_no_and_eof() {
        assert!(!answer("n\n").0);
        assert!(!answer("no\n").0);
        assert!(!answer("").0);
    }

    #[test]
    fn test_plain_list_is_one_line_per_item() {
        let rows = vec![Row { id: "a".into() }, Row { id: "b".into() }];
        let mut out = Vec::<u8>::new();
        print_list(&mut out, &rows, OutputFormat::Plain).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "a\nb\n");
    }

    #[test]
    fn test_json_list() {
        let rows = vec![Row { id: "a".into() }];
        let mut out = Vec::<u8>::new();
        print_list(&mut out, &rows, OutputFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(value[0]["id"], "a");
    }
}
