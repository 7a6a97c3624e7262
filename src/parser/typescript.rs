//! Import scanner for the TS/JS family (including `.vue` / `.svelte`).
//!
//! Statement grammar for imports is narrow, so this scanner works on regexes
//! over comment-blanked text instead of a full syntax tree. Matches whose
//! keyword sits inside a string literal are discarded. The character classes
//! between `import`/`export` and `from` exclude quotes, semicolons and
//! parentheses, so a lazy match can never run across a neighbouring
//! statement's specifier.

use regex::Regex;
use std::sync::LazyLock;

use super::source::{extract_script_blocks, mask_js_source, LineIndex};
use super::{ParseReport, ReferenceCollector, ReferenceKind};

static IMPORT_FROM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\bimport\s*(?:type\s+)?[^;'"`()]*?\bfrom\s*['"]([^'"\n]+)['"]"#)
        .expect("valid import pattern")
});

static IMPORT_BARE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\bimport\s*['"]([^'"\n]+)['"]"#).expect("valid side-effect import pattern")
});

static EXPORT_FROM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\bexport\s*(?:type\s+)?[^;'"`()=]*?\bfrom\s*['"]([^'"\n]+)['"]"#)
        .expect("valid re-export pattern")
});

static REQUIRE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\brequire\s*\(\s*['"]([^'"\n]+)['"]\s*\)"#).expect("valid require pattern")
});

static DYNAMIC_IMPORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\bimport\s*\(\s*['"]([^'"\n]+)['"]\s*\)"#).expect("valid dynamic import pattern")
});

static STATEMENT_KEYWORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:import|export)\b").expect("valid keyword pattern"));

static MENTIONS_IMPORT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:import|require)\b").expect("valid keyword pattern"));

/// Regex-based import parser for TypeScript, JavaScript and script containers.
#[derive(Debug, Clone, Copy, Default)]
pub struct TsImportParser {
    container: bool,
}

impl TsImportParser {
    pub fn new() -> Self {
        Self { container: false }
    }

    /// Parser for markup containers: only `<script>` bodies are scanned.
    pub fn for_container() -> Self {
        Self { container: true }
    }

    pub fn parse(&self, content: &str) -> ParseReport {
        let script;
        let code = if self.container {
            script = extract_script_blocks(content);
            script.as_str()
        } else {
            content
        };

        let masked = mask_js_source(code);
        let lines = LineIndex::new(&masked.text);
        let mut collector = ReferenceCollector::default();

        let patterns: [(&Regex, ReferenceKind); 5] = [
            (&IMPORT_FROM, ReferenceKind::Import),
            (&IMPORT_BARE, ReferenceKind::Import),
            (&EXPORT_FROM, ReferenceKind::Export),
            (&REQUIRE, ReferenceKind::Require),
            (&DYNAMIC_IMPORT, ReferenceKind::Dynamic),
        ];

        for (pattern, kind) in patterns {
            let mut pos = 0;
            while let Some(caps) = pattern.captures_at(&masked.text, pos) {
                let (Some(whole), Some(spec)) = (caps.get(0), caps.get(1)) else {
                    break;
                };
                // Semicolon-free code: `export default Foo\nimport x from 'y'`
                // must restart at the inner keyword rather than claim 'y'.
                if let Some(inner) = STATEMENT_KEYWORD.find_at(whole.as_str(), 1) {
                    pos = whole.start() + inner.start();
                    continue;
                }
                pos = whole.end();
                if masked.in_string(whole.start()) {
                    continue;
                }
                let module_path = spec.as_str().trim();
                if module_path.is_empty() {
                    continue;
                }
                collector.push_at(module_path, kind, lines.line_of(whole.start()), whole.start());
            }
        }

        let references = collector.finish();
        let degraded = references.is_empty()
            && MENTIONS_IMPORT
                .find_iter(&masked.text)
                .any(|m| !masked.in_string(m.start()));
        ParseReport {
            references,
            degraded,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn specs(report: &ParseReport) -> Vec<(&str, ReferenceKind, usize)> {
        report
            .references
            .iter()
            .map(|r| (r.module_path.as_str(), r.kind, r.line))
            .collect()
    }

    #[test]
    fn test_all_statement_forms() {
        let src = r#"import React from 'react';
import { a, b } from "./utils";
import * as ns from './ns';
import type { T } from './types';
import './side-effect.css';
export { x } from './reexport';
export * from './star';
const fs = require('fs');
const lazy = await import('./lazy');
"#;
        let report = TsImportParser::new().parse(src);
        assert_eq!(
            specs(&report),
            vec![
                ("react", ReferenceKind::Import, 1),
                ("./utils", ReferenceKind::Import, 2),
                ("./ns", ReferenceKind::Import, 3),
                ("./types", ReferenceKind::Import, 4),
                ("./side-effect.css", ReferenceKind::Import, 5),
                ("./reexport", ReferenceKind::Export, 6),
                ("./star", ReferenceKind::Export, 7),
                ("fs", ReferenceKind::Require, 8),
                ("./lazy", ReferenceKind::Dynamic, 9),
            ]
        );
        assert!(!report.degraded);
    }

    #[test]
    fn test_multiline_import_reports_first_line() {
        let src = "\n\nimport {\n  alpha,\n  beta,\n} from './greek';\n";
        let report = TsImportParser::new().parse(src);
        assert_eq!(specs(&report), vec![("./greek", ReferenceKind::Import, 3)]);
    }

    #[test]
    fn test_comments_and_strings_ignored() {
        let src = r#"// import a from './commented'
/* import b from './block' */
const doc = "import c from './in-string'";
const tpl = `require('./in-template')`;
import d from './real';
"#;
        let report = TsImportParser::new().parse(src);
        assert_eq!(specs(&report), vec![("./real", ReferenceKind::Import, 5)]);
    }

    #[test]
    fn test_imports_after_regex_literals() {
        let src = "const QUOTES = /[`'\"]/g;\nimport a from './a';\nexport const strip = (s) => s.replace(/'/g, '');\nimport b from './b';\n";
        let report = TsImportParser::new().parse(src);
        assert_eq!(
            specs(&report),
            vec![
                ("./a", ReferenceKind::Import, 2),
                ("./b", ReferenceKind::Import, 4),
            ]
        );
    }

    #[test]
    fn test_duplicates_keep_first_line() {
        let src = "const a = require('./dup');\nimport b from './dup';\nimport c from './dup';\n";
        let report = TsImportParser::new().parse(src);
        assert_eq!(specs(&report), vec![("./dup", ReferenceKind::Require, 1)]);
    }

    #[test]
    fn test_adjacent_malformed_statement_is_skipped() {
        // The first statement never names a source; it must not swallow the
        // specifier of the statement that follows it.
        let src = "import { broken ;\nimport ok from './ok';\n";
        let report = TsImportParser::new().parse(src);
        assert_eq!(specs(&report), vec![("./ok", ReferenceKind::Import, 2)]);
    }

    #[test]
    fn test_semicolon_free_statements_stay_separate() {
        let src = "export default Widget\nimport x from './x'\nexport { y } from './y'\n";
        let report = TsImportParser::new().parse(src);
        assert_eq!(
            specs(&report),
            vec![
                ("./x", ReferenceKind::Import, 2),
                ("./y", ReferenceKind::Export, 3),
            ]
        );
    }

    #[test]
    fn test_garbage_never_panics() {
        let report = TsImportParser::new().parse("import from from from ' \n require( ");
        assert!(report.references.is_empty());
        assert!(report.degraded);
    }

    #[test]
    fn test_vue_container_uses_script_only() {
        let src = r#"<template>
  <p>import fake from './template-text'</p>
</template>
<script setup lang="ts">
import Child from './Child.vue'
import { store } from '@/store'
</script>
"#;
        let report = TsImportParser::for_container().parse(src);
        assert_eq!(
            specs(&report),
            vec![
                ("./Child.vue", ReferenceKind::Import, 5),
                ("@/store", ReferenceKind::Import, 6),
            ]
        );
    }

    #[test]
    fn test_generated_statements_complete() {
        let count = 40;
        let mut src = String::new();
        for i in 0..count {
            match i % 4 {
                0 => src.push_str(&format!("import m{i} from './mod{i}';\n")),
                1 => src.push_str(&format!("export * from './mod{i}';\n")),
                2 => src.push_str(&format!("const m{i} = require('./mod{i}');\n")),
                _ => src.push_str(&format!("const m{i} = import('./mod{i}');\n")),
            }
            src.push_str("// filler\n");
        }
        let report = TsImportParser::new().parse(&src);
        assert_eq!(report.references.len(), count);
        for (i, reference) in report.references.iter().enumerate() {
            assert_eq!(reference.module_path, format!("./mod{i}"));
            assert_eq!(reference.line, i * 2 + 1);
        }
    }
}
