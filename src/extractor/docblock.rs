use crate::error::Position;
use crate::extractor::{
    extraction_error, strip_gutter, BoundaryDetector, Extraction, RawAnnotationBlock, Symbol,
    SymbolKind,
};
use crate::scanner::SourceUnit;
use log::debug;
use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;

const EXTENSIONS: &[&str] = &["php", "java", "ts", "js", "cs"];

static RE_TYPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:(?:abstract|final|public|private|protected|internal|static|sealed|export|default|readonly|partial)\s+)*(?:class|interface|trait|enum|record|struct)\s+([A-Za-z_][A-Za-z0-9_]*)").unwrap()
});

static RE_FUNCTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:(?:public|private|protected|static|abstract|final|async|export)\s+)*function\s*&?\s*([A-Za-z_][A-Za-z0-9_]*)\s*\(").unwrap()
});

/// Typed method signature with at least one modifier (Java, C#, TypeScript)
static RE_METHOD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:(?:public|private|protected|static|abstract|final|async|override|virtual|synchronized)\s+)+(?:[A-Za-z_][\w<>\[\],.?]*\s+)?([A-Za-z_][A-Za-z0-9_]*)\s*\(").unwrap()
});

/// PHP property: `public ?int $id;`
static RE_PHP_PROPERTY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:(?:public|private|protected|static|readonly|var)\s+)+(\??[A-Za-z_\\][\w\\|?\[\]]*\s+)?\$([A-Za-z_][A-Za-z0-9_]*)").unwrap()
});

/// Java/C# field: `private List<Project> items;`
static RE_TYPED_FIELD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:(?:public|private|protected|static|final|readonly|const|internal)\s+)*([A-Za-z_][\w<>\[\],.?]*)\s+([A-Za-z_][A-Za-z0-9_]*)\s*(?:[;=]|\{\s*get)").unwrap()
});

/// TypeScript property: `name?: string;`
static RE_TS_FIELD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:(?:public|private|protected|readonly|static)\s+)*([A-Za-z_][A-Za-z0-9_]*)\??\s*:\s*([^;=]+?)\s*[;=]").unwrap()
});

/// C-family backend: annotations live in `/** ... */` docblocks.
///
/// Each block is bound to the declaration on the next code line, skipping
/// blank lines and attribute lines (`#[...]`, `@Override`, `[HttpGet]`).
/// Methods and fields are qualified with the type whose body encloses them.
pub struct DocblockDetector;

impl BoundaryDetector for DocblockDetector {
    fn name(&self) -> &'static str {
        "docblock"
    }

    fn handles(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|s| s.to_str())
            .is_some_and(|ext| EXTENSIONS.contains(&ext))
    }

    fn extract(&self, unit: &SourceUnit) -> Extraction {
        let mut extraction = Extraction::default();
        let lines: Vec<&str> = unit.contents.lines().collect();
        let mut scopes = TypeScopes::default();
        let mut i = 0;

        while i < lines.len() {
            let line = lines[i];
            let Some(col) = find_block_start(line) else {
                scopes.observe(line);
                i += 1;
                continue;
            };
            scopes.observe(&line[..col]);

            let start = Position::new(i + 1, col + 1);
            let Some((end_line, end_col)) = find_block_end(&lines, i, col + 3) else {
                extraction.diagnostics.push(extraction_error(
                    unit,
                    start,
                    "Unterminated annotation block",
                ));
                break;
            };

            let text = block_text(&lines, i, col + 3, end_line, end_col);
            let trailing = &lines[end_line][end_col + 2..];
            let symbol = bind_symbol(&lines, end_line + 1, trailing, scopes.current());
            scopes.observe(trailing);

            extraction.blocks.push(RawAnnotationBlock {
                symbol,
                start,
                end: Position::new(end_line + 1, end_col + 3),
                text,
            });
            i = end_line + 1;
        }

        debug!(
            "Found {} docblocks in {}",
            extraction.blocks.len(),
            unit.path.display()
        );
        extraction
    }
}

/// Column of a `/**` opener, ignoring the empty comment `/**/`.
fn find_block_start(line: &str) -> Option<usize> {
    let col = line.find("/**")?;
    if line[col..].starts_with("/**/") {
        return None;
    }
    Some(col)
}

fn find_block_end(lines: &[&str], start_line: usize, start_col: usize) -> Option<(usize, usize)> {
    if let Some(offset) = lines[start_line][start_col..].find("*/") {
        return Some((start_line, start_col + offset));
    }
    lines
        .iter()
        .enumerate()
        .skip(start_line + 1)
        .find_map(|(idx, line)| line.find("*/").map(|col| (idx, col)))
}

fn block_text(lines: &[&str], start_line: usize, start_col: usize, end_line: usize, end_col: usize) -> String {
    if start_line == end_line {
        return lines[start_line][start_col..end_col].trim().to_string();
    }

    let mut text = vec![lines[start_line][start_col..].trim()];
    for line in &lines[start_line + 1..end_line] {
        text.push(strip_gutter(line));
    }
    text.push(strip_gutter(&lines[end_line][..end_col]));
    text.join("\n")
}

/// Finds the declaration following a block, or a file-level symbol.
fn bind_symbol(lines: &[&str], from: usize, trailing: &str, current_type: Option<&str>) -> Symbol {
    let candidate = if trailing.trim().is_empty() {
        lines
            .iter()
            .skip(from)
            .map(|line| line.trim())
            .find(|line| !line.is_empty() && !is_attribute_line(line))
    } else {
        Some(trailing.trim())
    };

    match candidate {
        Some(line) if !line.starts_with("/*") => declaration_symbol(line, current_type),
        _ => Symbol::file(),
    }
}

/// Tracks which type bodies enclose the current line by counting braces
/// outside string literals and line comments.
#[derive(Default)]
struct TypeScopes {
    depth: usize,
    /// Declared type whose body has not been opened yet
    pending: Option<String>,
    /// Open type bodies with the brace depth inside them
    open: Vec<(String, usize)>,
}

impl TypeScopes {
    fn current(&self) -> Option<&str> {
        self.pending
            .as_deref()
            .or_else(|| self.open.last().map(|(name, _)| name.as_str()))
    }

    fn observe(&mut self, line: &str) {
        if let Some(caps) = RE_TYPE.captures(line) {
            self.pending = Some(caps[1].to_string());
        }

        let mut quote: Option<char> = None;
        let mut chars = line.chars().peekable();
        while let Some(c) = chars.next() {
            if let Some(q) = quote {
                if c == '\\' {
                    chars.next();
                } else if c == q {
                    quote = None;
                }
                continue;
            }
            match c {
                '"' | '\'' | '`' => quote = Some(c),
                '/' if chars.peek() == Some(&'/') => break,
                '#' if chars.peek() != Some(&'[') => break,
                '{' => {
                    self.depth += 1;
                    if let Some(name) = self.pending.take() {
                        self.open.push((name, self.depth));
                    }
                }
                '}' => {
                    if self.open.last().is_some_and(|(_, depth)| *depth == self.depth) {
                        self.open.pop();
                    }
                    self.depth = self.depth.saturating_sub(1);
                }
                _ => {}
            }
        }
    }
}

fn is_attribute_line(line: &str) -> bool {
    line.starts_with("#[")
        || line.starts_with("//")
        || (line.starts_with('@') && !line.starts_with("@\""))
        || (line.starts_with('[') && line.ends_with(']'))
}

fn declaration_symbol(line: &str, current_type: Option<&str>) -> Symbol {
    if let Some(caps) = RE_TYPE.captures(line) {
        return Symbol::new(SymbolKind::Type, caps[1].to_string());
    }

    let qualify = |sep: &str, name: &str| match current_type {
        Some(ty) => format!("{}{}{}", ty, sep, name),
        None => name.to_string(),
    };

    if let Some(caps) = RE_FUNCTION.captures(line).or_else(|| RE_METHOD.captures(line)) {
        return Symbol::new(SymbolKind::Method, qualify("::", &caps[1]));
    }
    if let Some(caps) = RE_PHP_PROPERTY.captures(line) {
        let declared = caps.get(1).map(|m| m.as_str().trim().to_string());
        return Symbol::field(qualify(".", &caps[2]), declared);
    }
    if let Some(caps) = RE_TYPED_FIELD.captures(line) {
        return Symbol::field(qualify(".", &caps[2]), Some(caps[1].to_string()));
    }
    if let Some(caps) = RE_TS_FIELD.captures(line) {
        return Symbol::field(qualify(".", &caps[1]), Some(caps[2].trim().to_string()));
    }
    Symbol::file()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn extract(name: &str, code: &str) -> Extraction {
        let unit = SourceUnit::new(PathBuf::from(name), code.to_string());
        DocblockDetector.extract(&unit)
    }

    #[test]
    fn test_php_controller_blocks() {
        let code = r#"<?php

namespace App\Http\Controllers;

/**
 * @OA\Info(title="Projects API", version="1.0.0")
 */
class ProjectController extends Controller
{
    /**
     * Display a listing of the resource.
     *
     * @OA\Get(
     *     path="/projects",
     *     @OA\Response(response=200, description="OK")
     * )
     */
    #[Route('/projects')]
    public function index()
    {
    }
}
"#;
        let extraction = extract("ProjectController.php", code);

        assert!(extraction.diagnostics.is_empty());
        assert_eq!(extraction.blocks.len(), 2);

        let info = &extraction.blocks[0];
        assert_eq!(info.symbol, Symbol::new(SymbolKind::Type, "ProjectController"));
        assert_eq!(info.start, Position::new(5, 1));
        assert_eq!(info.text, "\n@OA\\Info(title=\"Projects API\", version=\"1.0.0\")\n");

        let index = &extraction.blocks[1];
        assert_eq!(index.symbol, Symbol::new(SymbolKind::Method, "ProjectController::index"));
        assert_eq!(index.start, Position::new(10, 5));
        let lines: Vec<&str> = index.text.lines().collect();
        assert_eq!(lines[3], "@OA\\Get(");
        assert_eq!(lines[4], "    path=\"/projects\",");
    }

    #[test]
    fn test_php_properties() {
        let code = r#"<?php
/** @OA\Schema(schema="Project") */
class Project
{
    /** @OA\Property(example=1) */
    public ?int $id;

    /**
     * @OA\Property()
     */
    protected $name;
}
"#;
        let extraction = extract("Project.php", code);

        let symbols: Vec<_> = extraction.blocks.iter().map(|b| b.symbol.clone()).collect();
        assert_eq!(
            symbols,
            vec![
                Symbol::new(SymbolKind::Type, "Project"),
                Symbol::field("Project.id", Some("?int".to_string())),
                Symbol::field("Project.name", None),
            ]
        );
        assert_eq!(extraction.blocks[0].text, "@OA\\Schema(schema=\"Project\")");
    }

    #[test]
    fn test_java_and_typescript_declarations() {
        let java = r#"
public class UserResource {
    /** @Property() */
    private List<String> roles;

    /** @Get(path="/users") */
    @GetMapping("/users")
    public ResponseEntity<List<User>> list() {
    }
}
"#;
        let extraction = extract("UserResource.java", java);
        assert_eq!(
            extraction.blocks[0].symbol,
            Symbol::field("UserResource.roles", Some("List<String>".to_string()))
        );
        assert_eq!(
            extraction.blocks[1].symbol,
            Symbol::new(SymbolKind::Method, "UserResource::list")
        );

        let ts = "export class Project {\n  /** @Property() */\n  title?: string;\n}\n";
        let extraction = extract("project.ts", ts);
        assert_eq!(
            extraction.blocks[0].symbol,
            Symbol::field("Project.title", Some("string".to_string()))
        );
    }

    #[test]
    fn test_function_after_class_body_is_not_qualified() {
        let code = r#"<?php
class HealthController
{
    /** @OA\Get(path="/health") */
    public function show()
    {
        $label = "{braces} in strings";
    }
}

/** @OA\Get(path="/ping") */
function ping() {}
"#;
        let extraction = extract("health.php", code);

        assert_eq!(
            extraction.blocks[0].symbol,
            Symbol::new(SymbolKind::Method, "HealthController::show")
        );
        assert_eq!(extraction.blocks[1].symbol, Symbol::new(SymbolKind::Method, "ping"));
    }

    #[test]
    fn test_block_without_declaration_is_file_level() {
        let code = "<?php\n/**\n * @OA\\Server(url=\"http://localhost\")\n */\n\n/** @OA\\Tag(name=\"Projects\") */\n";
        let extraction = extract("swagger.php", code);

        assert_eq!(extraction.blocks.len(), 2);
        assert!(extraction.blocks.iter().all(|b| b.symbol == Symbol::file()));
    }

    #[test]
    fn test_unterminated_block_keeps_earlier_blocks() {
        let code = "<?php\n/** @OA\\Tag(name=\"A\") */\nclass A {}\n\n  /**\n * @OA\\Tag(name=\"B\")\nclass B {}\n";
        let extraction = extract("broken.php", code);

        assert_eq!(extraction.blocks.len(), 1);
        assert_eq!(extraction.diagnostics.len(), 1);
        let location = extraction.diagnostics[0].location.as_ref().unwrap();
        assert_eq!(location.position, Position::new(5, 3));
    }

    #[test]
    fn test_plain_comments_are_ignored() {
        let code = "<?php\n/* not docs */\n/**/\n// @OA\\Tag(name=\"x\")\nclass A {}\n";
        let extraction = extract("plain.php", code);
        assert!(extraction.blocks.is_empty());
        assert!(extraction.diagnostics.is_empty());
    }

    #[test]
    fn test_handles_extensions() {
        assert!(DocblockDetector.handles(Path::new("A.php")));
        assert!(DocblockDetector.handles(Path::new("a.ts")));
        assert!(!DocblockDetector.handles(Path::new("a.rs")));
    }
}
