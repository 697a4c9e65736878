// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Reader for template text loaded into the in-memory host.
//!
//! Only the statements that change cell state are kept: global assignments
//! ahead of the template, section list creation, the morphology load and
//! axon replacement calls in `init`, `forsec this.<list>` / `forsec
//! CellRef.<list>` blocks and `distribute_distance` calls. Helper procedures
//! are accepted and otherwise skipped.

use super::{HostError, HostResult};
use crate::error::is_valid_identifier;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Statement {
    Insert {
        seclist: String,
        suffix: String,
    },
    Assign {
        seclist: String,
        attribute: String,
        value: f64,
    },
    Distribute {
        seclist: String,
        attribute: String,
        formula: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct MorphologyCall {
    /// File used when the constructor gets no morphology name
    pub default_file: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct TemplateProgram {
    pub name: String,
    pub globals: Vec<(String, f64)>,
    pub seclists: Vec<String>,
    pub morphology: Option<MorphologyCall>,
    pub replace_axon: bool,
    /// Section name and position that `distribute_distance` measures from
    pub reference: (String, f64),
    pub statements: Vec<Statement>,
}

fn syntax(message: impl Into<String>) -> HostError {
    HostError::TemplateSyntax(message.into())
}

/// Remove `/* */` and `//` comments, keeping string literals intact
fn strip_comments(text: &str) -> HostResult<String> {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;
    let mut in_string = false;

    while i < chars.len() {
        let c = chars[i];
        if in_string {
            out.push(c);
            if c == '\\' && i + 1 < chars.len() {
                out.push(chars[i + 1]);
                i += 2;
                continue;
            }
            if c == '"' {
                in_string = false;
            }
            i += 1;
            continue;
        }
        match (c, chars.get(i + 1)) {
            ('"', _) => {
                in_string = true;
                out.push(c);
                i += 1;
            }
            ('/', Some('*')) => {
                let mut j = i + 2;
                loop {
                    if j + 1 >= chars.len() {
                        return Err(syntax("unterminated comment"));
                    }
                    if chars[j] == '*' && chars[j + 1] == '/' {
                        break;
                    }
                    if chars[j] == '\n' {
                        out.push('\n');
                    }
                    j += 1;
                }
                i = j + 2;
            }
            ('/', Some('/')) => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
            }
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }

    if in_string {
        return Err(syntax("unterminated string literal"));
    }
    Ok(out)
}

fn check_braces(text: &str) -> HostResult<()> {
    let mut depth: i64 = 0;
    let mut in_string = false;
    let mut escaped = false;
    for (line_no, line) in text.lines().enumerate() {
        for c in line.chars() {
            if in_string {
                match c {
                    _ if escaped => escaped = false,
                    '\\' => escaped = true,
                    '"' => in_string = false,
                    _ => {}
                }
                continue;
            }
            match c {
                '"' => in_string = true,
                '{' => depth += 1,
                '}' => {
                    depth -= 1;
                    if depth < 0 {
                        return Err(syntax(format!("unmatched '}}' on line {}", line_no + 1)));
                    }
                }
                _ => {}
            }
        }
    }
    if depth != 0 {
        return Err(syntax(format!("{} unclosed '{{'", depth)));
    }
    Ok(())
}

/// Quoted string literals of a call, in order
fn string_literals(text: &str) -> Vec<String> {
    let mut literals = Vec::new();
    let mut current: Option<String> = None;
    let mut escaped = false;
    for c in text.chars() {
        if let Some(literal) = current.as_mut() {
            if escaped {
                literal.push(c);
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c != '"' {
                literal.push(c);
            } else {
                literals.extend(current.take());
            }
        } else if c == '"' {
            current = Some(String::new());
        }
    }
    literals
}

/// `name = number`
fn assignment(line: &str) -> Option<(String, f64)> {
    let (name, value) = line.split_once('=')?;
    let name = name.trim();
    if !is_valid_identifier(name) {
        return None;
    }
    let value = value.trim().parse::<f64>().ok()?;
    Some((name.to_string(), value))
}

/// List name after `this.` / `CellRef.`
fn seclist_after_prefix(rest: &str) -> Option<String> {
    let rest = rest
        .strip_prefix("this.")
        .or_else(|| rest.strip_prefix("CellRef."))?;
    let name: String = rest
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect();
    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}

/// `this.soma[0] distance(0, 0.5)`
fn reference_point(line: &str) -> Option<(String, f64)> {
    let rest = line.strip_prefix("this.")?;
    let (section, call) = rest.split_once(char::is_whitespace)?;
    let args = call.trim().strip_prefix("distance(")?.strip_suffix(')')?;
    let (origin, position) = args.split_once(',')?;
    if origin.trim() != "0" {
        return None;
    }
    Some((section.to_string(), position.trim().parse().ok()?))
}

fn block_statements(seclist: &str, body: &[&str]) -> Vec<Statement> {
    let mut statements = Vec::new();
    for line in body.iter().map(|l| l.trim()).filter(|l| !l.is_empty()) {
        if let Some(suffix) = line.strip_prefix("insert ") {
            statements.push(Statement::Insert {
                seclist: seclist.to_string(),
                suffix: suffix.trim().to_string(),
            });
        } else if let Some((attribute, value)) = assignment(line) {
            statements.push(Statement::Assign {
                seclist: seclist.to_string(),
                attribute,
                value,
            });
        } else {
            tracing::trace!(target: "ephys_model::host", "Skipping statement in {} block: {}", seclist, line);
        }
    }
    statements
}

pub(crate) fn parse(text: &str) -> HostResult<TemplateProgram> {
    let text = strip_comments(text)?;
    check_braces(&text)?;

    let lines: Vec<&str> = text.lines().map(str::trim).collect();

    let mut begin = None;
    for (index, line) in lines.iter().enumerate() {
        let mut tokens = line.split_whitespace();
        if tokens.next() == Some("begintemplate") {
            if begin.is_some() {
                return Err(syntax("more than one begintemplate"));
            }
            let name = tokens
                .next()
                .ok_or_else(|| syntax("begintemplate without a name"))?;
            if !is_valid_identifier(name) {
                return Err(syntax(format!("invalid template name '{}'", name)));
            }
            begin = Some((index, name.to_string()));
        }
    }
    let (begin, name) = begin.ok_or_else(|| syntax("missing begintemplate"))?;

    let end = lines
        .iter()
        .enumerate()
        .skip(begin + 1)
        .find(|(_, line)| line.split_whitespace().next() == Some("endtemplate"))
        .map(|(index, line)| (index, line.split_whitespace().nth(1)))
        .ok_or_else(|| syntax(format!("missing endtemplate {}", name)))?;
    match end.1 {
        Some(end_name) if end_name == name => {}
        other => {
            return Err(syntax(format!(
                "begintemplate {} closed by endtemplate {}",
                name,
                other.unwrap_or("")
            )))
        }
    }
    let end = end.0;

    let globals = lines[..begin].iter().filter_map(|line| assignment(line)).collect();

    let mut program = TemplateProgram {
        name,
        globals,
        seclists: Vec::new(),
        morphology: None,
        replace_axon: false,
        reference: ("soma[0]".to_string(), 0.5),
        statements: Vec::new(),
    };

    let body = &lines[begin + 1..end];
    let mut i = 0;
    while i < body.len() {
        let line = body[i];
        i += 1;

        if let Some((list, rhs)) = line.split_once('=') {
            if rhs.trim() == "new SectionList()" && is_valid_identifier(list.trim()) {
                program.seclists.push(list.trim().to_string());
                continue;
            }
        }

        if line.starts_with("load_morphology(") {
            let default_file = string_literals(line).into_iter().next();
            match program.morphology.as_mut() {
                Some(call) if call.default_file.is_none() => call.default_file = default_file,
                Some(_) => {}
                None => program.morphology = Some(MorphologyCall { default_file }),
            }
            continue;
        }

        if line == "replace_axon()" {
            program.replace_axon = true;
            continue;
        }

        if let Some(reference) = reference_point(line) {
            program.reference = reference;
            continue;
        }

        if let Some(rest) = line.strip_prefix("distribute_distance(") {
            let seclist = seclist_after_prefix(rest)
                .ok_or_else(|| syntax(format!("distribute_distance needs a section list: {}", line)))?;
            let literals = string_literals(rest);
            if literals.len() != 2 {
                return Err(syntax(format!("malformed distribute_distance call: {}", line)));
            }
            let mut literals = literals.into_iter();
            program.statements.push(Statement::Distribute {
                seclist,
                attribute: literals.next().unwrap_or_default(),
                formula: literals.next().unwrap_or_default(),
            });
            continue;
        }

        if let Some(rest) = line.strip_prefix("forsec ") {
            let Some(seclist) = seclist_after_prefix(rest.trim_start()) else {
                continue;
            };
            let Some(open) = line.find('{') else {
                return Err(syntax(format!("forsec block without '{{': {}", line)));
            };
            let inline = &line[open + 1..];
            if let Some(close) = inline.rfind('}') {
                program
                    .statements
                    .extend(block_statements(&seclist, &[&inline[..close]]));
                continue;
            }
            let start = i;
            while i < body.len() && body[i] != "}" {
                i += 1;
            }
            if i == body.len() {
                return Err(syntax(format!("unterminated forsec {} block", seclist)));
            }
            program
                .statements
                .extend(block_statements(&seclist, &body[start..i]));
            i += 1;
        }
    }

    Ok(program)
}
