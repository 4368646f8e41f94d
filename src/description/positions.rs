//! Source positions of description nodes.
//!
//! `serde_yaml` and `serde_json` drop node marks, so the loader indexes the
//! document text separately and looks nodes up by their key path. Lines and
//! columns are 1-based. Block YAML is indexed down to every key and
//! sequence item; nodes inside a flow collection (`[..]`, `{..}`) are only
//! known through the collection itself and inherit its position.

use std::collections::BTreeMap;

/// Key path of a node. Sequence items are keyed by their index.
pub(crate) type NodePath = Vec<String>;

/// Position of every indexed node of a document.
#[derive(Debug, Default)]
pub(crate) struct Positions {
    marks: BTreeMap<NodePath, (usize, usize)>,
}

impl Positions {
    pub(crate) fn get(&self, path: &[String]) -> Option<(usize, usize)> {
        self.marks.get(path).copied()
    }

    fn mark(&mut self, path: &[String], line: usize, column: usize) {
        self.marks.insert(path.to_vec(), (line, column + 1));
    }
}

struct Block {
    indent: usize,
    path: NodePath,
    sequence: bool,
    next_item: usize,
}

/// A key whose value starts on a later line.
struct Pending {
    path: NodePath,
    /// Indentation of the line holding the key. `None` for the document root.
    indent: Option<usize>,
}

/// Index a block-style YAML document.
pub(crate) fn yaml_positions(text: &str) -> Positions {
    let mut positions = Positions::default();
    let mut blocks: Vec<Block> = Vec::new();
    let mut pending = Some(Pending {
        path: Vec::new(),
        indent: None,
    });
    let mut block_scalar: Option<usize> = None;
    let mut flow_depth = 0i32;

    for (index, line) in text.lines().enumerate() {
        let lineno = index + 1;
        let rest = line.trim_start_matches(' ');
        let indent = line.len() - rest.len();

        if flow_depth > 0 {
            flow_depth += bracket_balance(rest);
            continue;
        }
        if let Some(limit) = block_scalar {
            if rest.trim().is_empty() || indent > limit {
                continue;
            }
            block_scalar = None;
        }

        let content = strip_comment(rest);
        if content.is_empty() || content.starts_with("---") || content == "..." || content.starts_with('%') {
            continue;
        }
        let dash = is_item(content);

        if let Some(p) = pending.take() {
            let nested = p.indent.map_or(true, |parent| indent > parent || (indent == parent && dash));
            if nested {
                positions.mark(&p.path, lineno, indent);
                blocks.push(Block {
                    indent,
                    path: p.path,
                    sequence: dash,
                    next_item: 0,
                });
            }
        }

        while let Some(top) = blocks.last() {
            if top.indent > indent || (top.indent == indent && top.sequence && !dash) {
                blocks.pop();
            } else {
                break;
            }
        }
        if blocks.last().map_or(true, |top| top.indent != indent) {
            // Continuation of a multi-line plain scalar.
            continue;
        }

        let state = LineState {
            lineno,
            block_scalar: &mut block_scalar,
            flow_depth: &mut flow_depth,
            pending: &mut pending,
        };
        entry(&mut positions, &mut blocks, state, content, indent);
    }

    positions
}

struct LineState<'a> {
    lineno: usize,
    block_scalar: &'a mut Option<usize>,
    flow_depth: &'a mut i32,
    pending: &'a mut Option<Pending>,
}

fn entry(positions: &mut Positions, blocks: &mut Vec<Block>, state: LineState<'_>, content: &str, column: usize) {
    let Some(block) = blocks.last_mut() else {
        return;
    };

    if block.sequence {
        if !is_item(content) {
            return;
        }
        let mut path = block.path.clone();
        path.push(block.next_item.to_string());
        block.next_item += 1;

        let after = &content[1..];
        let item = after.trim_start_matches(' ');
        let item_column = column + 1 + (after.len() - item.len());

        if item.is_empty() {
            positions.mark(&path, state.lineno, column);
            *state.pending = Some(Pending {
                path,
                indent: Some(column),
            });
        } else if split_key(item).is_some() {
            positions.mark(&path, state.lineno, item_column);
            blocks.push(Block {
                indent: item_column,
                path,
                sequence: false,
                next_item: 0,
            });
            entry(positions, blocks, state, item, item_column);
        } else {
            positions.mark(&path, state.lineno, item_column);
            scalar_value(state, item, column);
        }
        return;
    }

    if content.starts_with('[') || content.starts_with('{') {
        *state.flow_depth = bracket_balance(content);
        return;
    }
    let Some((key, value_offset)) = split_key(content) else {
        return;
    };

    let mut path = block.path.clone();
    path.push(key);
    let value = &content[value_offset..];
    if value.is_empty() {
        positions.mark(&path, state.lineno, column);
        *state.pending = Some(Pending {
            path,
            indent: Some(column),
        });
    } else {
        positions.mark(&path, state.lineno, column + value_offset);
        scalar_value(state, value, column);
    }
}

/// Track values that continue on the following lines.
fn scalar_value(state: LineState<'_>, value: &str, column: usize) {
    if value.starts_with('|') || value.starts_with('>') {
        *state.block_scalar = Some(column);
    } else if value.starts_with('[') || value.starts_with('{') {
        *state.flow_depth = bracket_balance(value);
    }
}

fn is_item(content: &str) -> bool {
    content == "-" || content.starts_with("- ")
}

/// Split `key: value`, returning the unquoted key and the offset of the value.
fn split_key(content: &str) -> Option<(String, usize)> {
    let (key, after) = if let Some(quote @ ('"' | '\'')) = content.chars().next() {
        let end = content[1..].find(quote)? + 1;
        (content[1..end].to_string(), end + 1)
    } else {
        if content.starts_with('[') || content.starts_with('{') {
            return None;
        }
        let colon = content
            .match_indices(':')
            .map(|(i, _)| i)
            .find(|&i| content[i + 1..].is_empty() || content[i + 1..].starts_with(' '))?;
        (content[..colon].trim_end().to_string(), colon)
    };

    let rest = content[after..].strip_prefix(':')?;
    if !(rest.is_empty() || rest.starts_with(' ')) {
        return None;
    }
    let value = rest.trim_start_matches(' ');
    Some((key, content.len() - value.len()))
}

/// Drop a trailing comment and whitespace.
fn strip_comment(content: &str) -> &str {
    let mut quote = None;
    let mut previous = ' ';
    for (i, c) in content.char_indices() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None if (c == '"' || c == '\'') && matches!(previous, ' ' | '[' | '{' | ',') => quote = Some(c),
            None if c == '#' && previous == ' ' => return content[..i].trim_end(),
            None => {}
        }
        previous = c;
    }
    content.trim_end()
}

fn bracket_balance(text: &str) -> i32 {
    let mut quote = None;
    let mut depth = 0;
    for c in text.chars() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None => match c {
                '"' | '\'' => quote = Some(c),
                '[' | '{' => depth += 1,
                ']' | '}' => depth -= 1,
                '#' => break,
                _ => {}
            },
        }
    }
    depth
}

/// Index a JSON document. The text must already be valid JSON.
pub(crate) fn json_positions(text: &str) -> Positions {
    let mut scanner = JsonScanner {
        text: text.as_bytes(),
        pos: 0,
        line: 1,
        line_start: 0,
        positions: Positions::default(),
    };
    let mut path = Vec::new();
    scanner.value(&mut path);
    scanner.positions
}

struct JsonScanner<'a> {
    text: &'a [u8],
    pos: usize,
    line: usize,
    line_start: usize,
    positions: Positions,
}

impl JsonScanner<'_> {
    fn peek(&self) -> Option<u8> {
        self.text.get(self.pos).copied()
    }

    fn bump(&mut self) {
        if self.peek() == Some(b'\n') {
            self.line += 1;
            self.line_start = self.pos + 1;
        }
        self.pos += 1;
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(b' ' | b'\t' | b'\r' | b'\n')) {
            self.bump();
        }
    }

    fn value(&mut self, path: &mut NodePath) {
        self.skip_whitespace();
        let column = self.pos - self.line_start;
        self.positions.mark(path, self.line, column);

        match self.peek() {
            Some(b'{') => {
                self.bump();
                loop {
                    self.skip_whitespace();
                    match self.peek() {
                        Some(b'"') => {
                            let key = self.string();
                            self.skip_whitespace();
                            if self.peek() == Some(b':') {
                                self.bump();
                            }
                            path.push(key);
                            self.value(path);
                            path.pop();
                        }
                        Some(b',') => self.bump(),
                        Some(b'}') => {
                            self.bump();
                            break;
                        }
                        _ => break,
                    }
                }
            }
            Some(b'[') => {
                self.bump();
                let mut index = 0usize;
                loop {
                    self.skip_whitespace();
                    match self.peek() {
                        Some(b',') => self.bump(),
                        Some(b']') => {
                            self.bump();
                            break;
                        }
                        None => break,
                        _ => {
                            path.push(index.to_string());
                            self.value(path);
                            path.pop();
                            index += 1;
                        }
                    }
                }
            }
            Some(b'"') => {
                self.string();
            }
            _ => {
                while let Some(c) = self.peek() {
                    if matches!(c, b',' | b']' | b'}' | b' ' | b'\t' | b'\r' | b'\n') {
                        break;
                    }
                    self.bump();
                }
            }
        }
    }

    fn string(&mut self) -> String {
        self.bump();
        let start = self.pos;
        while let Some(c) = self.peek() {
            match c {
                b'\\' => {
                    self.bump();
                    self.bump();
                }
                b'"' => break,
                _ => self.bump(),
            }
        }
        let raw = &self.text[start..self.pos.min(self.text.len())];
        self.bump();
        serde_json::from_slice::<String>(&[&b"\""[..], raw, &b"\""[..]].concat())
            .unwrap_or_else(|_| String::from_utf8_lossy(raw).into_owned())
    }
}
