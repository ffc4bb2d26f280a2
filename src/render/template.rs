use crate::model::PeerReplica;
use crate::render::{BindingValue, Bindings};
use std::io;
use std::path::PathBuf;

// A small subset of a template language, enough for the store's
// config template:
//
// - `{{.key}}`                              substitute a binding
// - `{{if .key}} ... {{else}} ... {{end}}`  gate on a flag (or a non-empty list)
// - `{{range .key}} ... {{end}}`            repeat per peer replica; inside, `{{.id}}`,
//                                           `{{.host}}`, `{{.port}}`, `{{.role}}` are the peer's
// - `{{- ...}}` / `{{... -}}`               trim whitespace before / after the action. The
//                                           dash must be separated from the action by a space

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("I/O failure on '{}'", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("template syntax error on line {line}: {message}")]
    Syntax { line: usize, message: String },
    #[error("template references unbound key '{0}'")]
    MissingKey(String),
    #[error("binding '{key}' cannot be used as {expected}")]
    TypeMismatch { key: String, expected: &'static str },
}

/// Render `template` with `bindings`. Either the whole template renders, or nothing does.
pub fn render(template: &str, bindings: &Bindings) -> Result<String, RenderError> {
    let tokens = tokenize(template)?;
    let nodes = parse(tokens)?;

    let mut out = String::with_capacity(template.len());
    render_nodes(&nodes, bindings, None, &mut out)?;
    Ok(out)
}

// -- tokenize --

enum Token {
    Text(String),
    Action { body: String, line: usize },
}

fn tokenize(template: &str) -> Result<Vec<Token>, RenderError> {
    let mut tokens = Vec::new();
    let mut rest = template;
    let mut line = 1;
    let mut trim_next_text = false;

    while let Some(open) = rest.find("{{") {
        let mut text = &rest[..open];
        if trim_next_text {
            text = text.trim_start();
        }
        line += rest[..open].matches('\n').count();

        let after_open = &rest[open + 2..];
        let close = after_open.find("}}").ok_or_else(|| RenderError::Syntax {
            line,
            message: "unterminated action, missing '}}'".to_string(),
        })?;
        let mut body = &after_open[..close];

        // A trim marker is a dash with whitespace on its inner side. `{{-3}}` is not one.
        if body.starts_with('-') && body[1..].starts_with(is_trim_space) {
            text = text.trim_end();
            body = &body[1..];
        }
        trim_next_text = body.ends_with('-') && body[..body.len() - 1].ends_with(is_trim_space);
        if trim_next_text {
            body = &body[..body.len() - 1];
        }

        if !text.is_empty() {
            tokens.push(Token::Text(text.to_string()));
        }
        tokens.push(Token::Action {
            body: body.trim().to_string(),
            line,
        });

        line += body.matches('\n').count();
        rest = &after_open[close + 2..];
    }

    let tail = if trim_next_text { rest.trim_start() } else { rest };
    if !tail.is_empty() {
        tokens.push(Token::Text(tail.to_string()));
    }

    Ok(tokens)
}

fn is_trim_space(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\r' | '\n')
}

// -- parse --

enum Node {
    Text(String),
    Var(String),
    If {
        key: String,
        then: Vec<Node>,
        otherwise: Vec<Node>,
    },
    Range {
        key: String,
        body: Vec<Node>,
    },
}

enum Directive {
    Var(String),
    If(String),
    Range(String),
    Else,
    End,
}

enum Terminator {
    Else(usize),
    End(usize),
    Eof,
}

fn parse(tokens: Vec<Token>) -> Result<Vec<Node>, RenderError> {
    let mut iter = tokens.into_iter();
    let (nodes, terminator) = parse_block(&mut iter)?;

    match terminator {
        Terminator::Eof => Ok(nodes),
        Terminator::Else(line) => Err(syntax(line, "'{{else}}' outside of '{{if}}'")),
        Terminator::End(line) => Err(syntax(line, "unmatched '{{end}}'")),
    }
}

fn parse_block<I: Iterator<Item = Token>>(tokens: &mut I) -> Result<(Vec<Node>, Terminator), RenderError> {
    let mut nodes = Vec::new();

    while let Some(token) = tokens.next() {
        let (body, line) = match token {
            Token::Text(text) => {
                nodes.push(Node::Text(text));
                continue;
            }
            Token::Action { body, line } => (body, line),
        };

        match parse_directive(&body, line)? {
            Directive::Var(key) => nodes.push(Node::Var(key)),
            Directive::If(key) => {
                let (then, terminator) = parse_block(tokens)?;
                let otherwise = match terminator {
                    Terminator::End(_) => vec![],
                    Terminator::Else(_) => match parse_block(tokens)? {
                        (otherwise, Terminator::End(_)) => otherwise,
                        (_, Terminator::Else(else_line)) => return Err(syntax(else_line, "duplicate '{{else}}'")),
                        (_, Terminator::Eof) => return Err(syntax(line, "'{{if}}' is never closed")),
                    },
                    Terminator::Eof => return Err(syntax(line, "'{{if}}' is never closed")),
                };
                nodes.push(Node::If { key, then, otherwise });
            }
            Directive::Range(key) => {
                let body = match parse_block(tokens)? {
                    (body, Terminator::End(_)) => body,
                    (_, Terminator::Else(else_line)) => {
                        return Err(syntax(else_line, "'{{else}}' is not supported in '{{range}}'"))
                    }
                    (_, Terminator::Eof) => return Err(syntax(line, "'{{range}}' is never closed")),
                };
                nodes.push(Node::Range { key, body });
            }
            Directive::Else => return Ok((nodes, Terminator::Else(line))),
            Directive::End => return Ok((nodes, Terminator::End(line))),
        }
    }

    Ok((nodes, Terminator::Eof))
}

fn parse_directive(body: &str, line: usize) -> Result<Directive, RenderError> {
    let mut words = body.split_whitespace();
    let directive = match (words.next(), words.next(), words.next()) {
        (Some(field), None, None) if field.starts_with('.') => Directive::Var(parse_key(field, line)?),
        (Some("if"), Some(field), None) => Directive::If(parse_key(field, line)?),
        (Some("range"), Some(field), None) => Directive::Range(parse_key(field, line)?),
        (Some("else"), None, None) => Directive::Else,
        (Some("end"), None, None) => Directive::End,
        _ => return Err(syntax(line, &format!("unsupported action '{{{{{}}}}}'", body))),
    };

    Ok(directive)
}

fn parse_key(field: &str, line: usize) -> Result<String, RenderError> {
    let key = field
        .strip_prefix('.')
        .ok_or_else(|| syntax(line, &format!("expected '.key', got '{}'", field)))?;

    if key.is_empty() || !key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(syntax(line, &format!("invalid key '{}'", field)));
    }

    Ok(key.to_string())
}

fn syntax(line: usize, message: &str) -> RenderError {
    RenderError::Syntax {
        line,
        message: message.to_string(),
    }
}

// -- render --

/// A value resolved from either the current range item or the bindings.
enum Resolved<'a> {
    Binding(&'a BindingValue),
    PeerField(String),
}

fn resolve<'a>(
    key: &str,
    bindings: &'a Bindings,
    peer: Option<&PeerReplica>,
) -> Result<Resolved<'a>, RenderError> {
    if let Some(peer) = peer {
        let field = match key {
            "id" => Some(peer.id.to_string()),
            "host" => Some(peer.host.clone()),
            "port" => Some(peer.port.to_string()),
            "role" => Some(peer.role.as_str().to_string()),
            _ => None,
        };
        if let Some(field) = field {
            return Ok(Resolved::PeerField(field));
        }
    }

    bindings
        .get(key)
        .map(Resolved::Binding)
        .ok_or_else(|| RenderError::MissingKey(key.to_string()))
}

fn render_nodes(
    nodes: &[Node],
    bindings: &Bindings,
    peer: Option<&PeerReplica>,
    out: &mut String,
) -> Result<(), RenderError> {
    for node in nodes {
        match node {
            Node::Text(text) => out.push_str(text),
            Node::Var(key) => match resolve(key, bindings, peer)? {
                Resolved::PeerField(field) => out.push_str(&field),
                Resolved::Binding(value) => match value.format() {
                    Some(formatted) => out.push_str(&formatted),
                    None => {
                        return Err(RenderError::TypeMismatch {
                            key: key.clone(),
                            expected: "a scalar",
                        })
                    }
                },
            },
            Node::If { key, then, otherwise } => {
                let truthy = match resolve(key, bindings, peer)? {
                    Resolved::PeerField(field) => !field.is_empty(),
                    Resolved::Binding(value) => value.is_truthy(),
                };
                let branch = if truthy { then } else { otherwise };
                render_nodes(branch, bindings, peer, out)?;
            }
            Node::Range { key, body } => {
                let replicas = match bindings.get(key) {
                    Some(BindingValue::Peers(replicas)) => replicas,
                    Some(_) => {
                        return Err(RenderError::TypeMismatch {
                            key: key.clone(),
                            expected: "a list",
                        })
                    }
                    None => return Err(RenderError::MissingKey(key.clone())),
                };
                for replica in replicas {
                    render_nodes(body, bindings, Some(replica), out)?;
                }
            }
        }
    }

    Ok(())
}
