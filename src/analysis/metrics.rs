//! Line-based static metrics for Java sources: non-comment lines of code,
//! token count, cyclomatic complexity and method names. A full implementation
//! would use an AST; line heuristics are enough for package-level aggregates.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

const BRANCHING_KEYWORDS: [&str; 8] = [
    "if ", "if(", "for ", "for(", "while ", "while(", "case ", "catch ",
];

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileMetrics {
    pub nloc: usize,
    pub token_count: usize,
    pub complexity: usize,
    pub methods: Vec<String>,
}

/// Totals plus per-file averages over one package directory.
#[derive(Debug, Clone, Default)]
pub struct PackageMetrics {
    pub files: usize,
    pub nloc: usize,
    pub token_count: usize,
    pub complexity: usize,
}

impl PackageMetrics {
    pub fn add(&mut self, file: &FileMetrics) {
        self.files += 1;
        self.nloc += file.nloc;
        self.token_count += file.token_count;
        self.complexity += file.complexity;
    }

    pub fn average_nloc(&self) -> f64 {
        self.average(self.nloc)
    }

    pub fn average_tokens(&self) -> f64 {
        self.average(self.token_count)
    }

    pub fn average_complexity(&self) -> f64 {
        self.average(self.complexity)
    }

    fn average(&self, total: usize) -> f64 {
        if self.files == 0 {
            0.0
        } else {
            total as f64 / self.files as f64
        }
    }
}

/// Analyze one Java source text.
pub fn analyze_source(source: &str) -> FileMetrics {
    let mut metrics = FileMetrics::default();
    let mut in_block_comment = false;
    let mut in_method = false;
    let mut brace_depth = 0i32;
    let mut method_start_depth = 0i32;

    for line in source.lines() {
        let trimmed = line.trim();

        if in_block_comment {
            if trimmed.contains("*/") {
                in_block_comment = false;
            }
            continue;
        }
        if trimmed.is_empty() || trimmed.starts_with("//") {
            continue;
        }
        if trimmed.starts_with("/*") {
            if !trimmed.contains("*/") {
                in_block_comment = true;
            }
            continue;
        }

        metrics.nloc += 1;
        metrics.token_count += count_tokens(trimmed);

        if !in_method && is_method_declaration(trimmed) {
            if let Some(name) = extract_method_name(trimmed) {
                metrics.methods.push(name);
                // Base complexity of one per method
                metrics.complexity += 1;
                in_method = true;
                method_start_depth = brace_depth;
            }
        }

        let opens = line.matches('{').count() as i32;
        let closes = line.matches('}').count() as i32;
        brace_depth += opens - closes;

        if in_method {
            for keyword in BRANCHING_KEYWORDS {
                metrics.complexity += trimmed.matches(keyword).count();
            }
            metrics.complexity += trimmed.matches("&&").count();
            metrics.complexity += trimmed.matches("||").count();

            if brace_depth <= method_start_depth && closes > 0 {
                in_method = false;
            }
        }
    }

    metrics
}

/// Analyze the `.java` files directly inside `package_dir` (subpackages are
/// separate packages and excluded).
pub fn analyze_package(package_dir: &Path) -> Result<PackageMetrics> {
    let mut package = PackageMetrics::default();

    let entries = fs::read_dir(package_dir)
        .with_context(|| format!("failed to read package dir {}", package_dir.display()))?;
    for entry in entries {
        let path = entry?.path();
        let is_java = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case("java"))
            .unwrap_or(false);
        if !path.is_file() || !is_java {
            continue;
        }
        // Sources with odd encodings are skipped rather than aborting the walk.
        let source = match fs::read_to_string(&path) {
            Ok(s) => s,
            Err(err) => {
                log::warn!("skipping unreadable source {}: {err}", path.display());
                continue;
            }
        };
        package.add(&analyze_source(&source));
    }

    Ok(package)
}

fn count_tokens(line: &str) -> usize {
    let mut tokens = 0;
    let mut in_word = false;
    for c in line.chars() {
        if c.is_alphanumeric() || c == '_' {
            if !in_word {
                tokens += 1;
                in_word = true;
            }
        } else {
            in_word = false;
            if !c.is_whitespace() {
                tokens += 1;
            }
        }
    }
    tokens
}

fn is_method_declaration(line: &str) -> bool {
    let has_modifier = line.starts_with("public ")
        || line.starts_with("private ")
        || line.starts_with("protected ")
        || line.starts_with("static ");
    has_modifier
        && line.contains('(')
        && !line.contains(" class ")
        && !line.contains(" interface ")
        && !line.contains(" enum ")
        && !line.contains('=')
        && !line.ends_with(';')
}

fn extract_method_name(line: &str) -> Option<String> {
    let before_paren = line.split('(').next()?;
    let name = before_paren.split_whitespace().last()?;
    if name.chars().all(|c| c.is_alphanumeric() || c == '_') && !name.is_empty() {
        Some(name.to_string())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIMPLE_CLASS: &str = "\
package org.example;

// A counter.
public class Counter {
    private int count = 0;

    public int increment() {
        count++;
        return count;
    }

    public boolean isPositive(int value) {
        if (value > 0 && count > 0) {
            return true;
        }
        return false;
    }
}
";

    #[test]
    fn counts_methods_and_skips_fields() {
        let metrics = analyze_source(SIMPLE_CLASS);
        assert_eq!(metrics.methods, vec!["increment", "isPositive"]);
    }

    #[test]
    fn comments_and_blanks_are_not_loc() {
        let metrics = analyze_source(SIMPLE_CLASS);
        // 15 non-blank lines minus the // comment
        assert_eq!(metrics.nloc, 14);
    }

    #[test]
    fn branches_add_complexity() {
        let metrics = analyze_source(SIMPLE_CLASS);
        // increment: 1, isPositive: 1 + if + &&
        assert_eq!(metrics.complexity, 4);
    }

    #[test]
    fn block_comments_are_excluded() {
        let source = "/*\n * licence\n */\npublic class A {\n}\n";
        let metrics = analyze_source(source);
        assert_eq!(metrics.nloc, 2);
        assert!(metrics.methods.is_empty());
    }

    #[test]
    fn empty_source_is_all_zero() {
        assert_eq!(analyze_source(""), FileMetrics::default());
    }

    #[test]
    fn package_analysis_ignores_subdirectories() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("A.java"), SIMPLE_CLASS).expect("write A");
        std::fs::write(dir.path().join("notes.txt"), "not java").expect("write txt");
        let sub = dir.path().join("sub");
        std::fs::create_dir(&sub).expect("mkdir");
        std::fs::write(sub.join("B.java"), SIMPLE_CLASS).expect("write B");

        let package = analyze_package(dir.path()).expect("analyze package");
        assert_eq!(package.files, 1);
        assert!(package.average_nloc() > 0.0);
    }

    #[test]
    fn package_analysis_matches_extensions_case_insensitively() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("A.java"), SIMPLE_CLASS).expect("write A");
        std::fs::write(dir.path().join("B.JAVA"), SIMPLE_CLASS).expect("write B");

        let package = analyze_package(dir.path()).expect("analyze package");
        assert_eq!(package.files, 2);
    }
}
