//! Compiled templates and their evaluation.

use super::{
    TemplateCache, TemplateError, Vars,
    helpers::{Builtins, HelperSet, Val, display_value, escape_html},
    parser::{self, Expr, Node},
};
use serde_json::{Map, Value};

/// Nested `include` calls allowed before rendering gives up.
const MAX_INCLUDE_DEPTH: usize = 16;

/// An executable template.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    name: String,
    nodes: Vec<Node>,
}

impl Template {
    /// Compile `source`; either the whole template compiles or nothing does.
    pub fn compile(name: &str, source: &str) -> Result<Self, TemplateError> {
        let nodes = parser::parse(source).map_err(|err| TemplateError::Compile {
            name: name.to_owned(),
            line: err.line,
            message: err.message,
        })?;
        Ok(Self {
            name: name.to_owned(),
            nodes,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Partials (`_sidebar.html`) are never wrapped in a layout.
    pub fn is_partial(&self) -> bool {
        let file = self.name.rsplit('/').next().unwrap_or(&self.name);
        file.starts_with('_')
    }
}

// ============================================================================
// Scope
// ============================================================================

/// Variable frames, innermost last.
#[derive(Debug, Default)]
pub struct Scope {
    frames: Vec<Map<String, Value>>,
}

impl Scope {
    pub fn new(vars: Vars) -> Self {
        Self { frames: vec![vars] }
    }

    pub fn push(&mut self, frame: Map<String, Value>) {
        self.frames.push(frame);
    }

    pub fn pop(&mut self) {
        self.frames.pop();
    }

    /// Resolve `post.title` or `posts.0`; anything missing is `nil`.
    pub fn lookup(&self, path: &[String]) -> Value {
        let Some((head, rest)) = path.split_first() else {
            return Value::Null;
        };
        let Some(mut value) = self.frames.iter().rev().find_map(|f| f.get(head)) else {
            return Value::Null;
        };
        for segment in rest {
            let next = match value {
                Value::Object(map) => map.get(segment),
                Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
                _ => None,
            };
            match next {
                Some(v) => value = v,
                None => return Value::Null,
            }
        }
        value.clone()
    }
}

// ============================================================================
// Renderer
// ============================================================================

/// Renders templates of one cache against one scope.
pub struct Renderer<'a> {
    cache: &'a TemplateCache,
    scope: Scope,
    depth: usize,
}

impl<'a> Renderer<'a> {
    pub fn new(cache: &'a TemplateCache, vars: Vars) -> Self {
        Self {
            cache,
            scope: Scope::new(vars),
            depth: 0,
        }
    }

    pub fn scope_mut(&mut self) -> &mut Scope {
        &mut self.scope
    }

    pub fn render(&mut self, template: &Template) -> Result<String, TemplateError> {
        let mut out = String::new();
        self.nodes(template, &template.nodes, &mut out)?;
        Ok(out)
    }

    fn nodes(&mut self, template: &Template, nodes: &[Node], out: &mut String) -> Result<(), TemplateError> {
        for node in nodes {
            match node {
                Node::Text(text) => out.push_str(text),
                Node::Output { expr, escape, line } => {
                    let val = self.eval(template, expr, *line)?;
                    match (&val, *escape) {
                        (Val::Data(v), true) => out.push_str(&escape_html(&display_value(v))),
                        _ => out.push_str(&val.display()),
                    }
                }
                Node::If { cond, then, otherwise, line } => {
                    let branch = if self.eval(template, cond, *line)?.truthy() { then } else { otherwise };
                    self.nodes(template, branch, out)?;
                }
                Node::For { var, iter, body, line } => {
                    let items = match self.eval(template, iter, *line)?.to_value() {
                        Value::Array(items) => items,
                        Value::Object(map) => map
                            .into_iter()
                            .map(|(key, value)| {
                                let mut entry = Map::new();
                                entry.insert("key".into(), Value::String(key));
                                entry.insert("value".into(), value);
                                Value::Object(entry)
                            })
                            .collect(),
                        Value::Null => Vec::new(),
                        other => {
                            return Err(render_error(template, *line, format!("cannot iterate over `{other}`")));
                        }
                    };

                    for (i, item) in items.into_iter().enumerate() {
                        let mut frame = Map::new();
                        frame.insert(var.clone(), item);
                        frame.insert("loop_index".into(), Value::from(i));
                        self.scope.push(frame);
                        let result = self.nodes(template, body, out);
                        self.scope.pop();
                        result?;
                    }
                }
            }
        }
        Ok(())
    }

    fn eval(&mut self, template: &Template, expr: &Expr, line: usize) -> Result<Val, TemplateError> {
        Ok(match expr {
            Expr::Str(s) => Val::text(s.clone()),
            Expr::Int(n) => Val::Data(Value::from(*n)),
            Expr::Bool(b) => Val::Data(Value::Bool(*b)),
            Expr::Nil => Val::null(),
            Expr::Path(path) => Val::Data(self.scope.lookup(path)),
            Expr::Not(inner) => Val::Data(Value::Bool(!self.eval(template, inner, line)?.truthy())),
            Expr::Eq(a, b) => {
                let (a, b) = (self.eval(template, a, line)?, self.eval(template, b, line)?);
                Val::Data(Value::Bool(a.loose_eq(&b)))
            }
            Expr::Ne(a, b) => {
                let (a, b) = (self.eval(template, a, line)?, self.eval(template, b, line)?);
                Val::Data(Value::Bool(!a.loose_eq(&b)))
            }
            // Both short-circuit and yield the deciding operand.
            Expr::And(a, b) => {
                let a = self.eval(template, a, line)?;
                if a.truthy() { self.eval(template, b, line)? } else { a }
            }
            Expr::Or(a, b) => {
                let a = self.eval(template, a, line)?;
                if a.truthy() { a } else { self.eval(template, b, line)? }
            }
            Expr::Call(name, args) => {
                let args = args
                    .iter()
                    .map(|arg| self.eval(template, arg, line))
                    .collect::<Result<Vec<_>, _>>()?;
                self.call(template, name, &args, line)?
            }
        })
    }

    fn call(&mut self, template: &Template, name: &str, args: &[Val], line: usize) -> Result<Val, TemplateError> {
        if name == "include" {
            return self.include(template, args, line);
        }

        let result = self
            .cache
            .helper_sets()
            .find_map(|set| set.call(name, args))
            .or_else(|| Builtins.call(name, args))
            .ok_or_else(|| format!("unknown helper `{name}`"))
            .and_then(|result| result);
        result.map_err(|message| render_error(template, line, message))
    }

    /// `include(name[, vars])`: render a partial in the current scope.
    fn include(&mut self, template: &Template, args: &[Val], line: usize) -> Result<Val, TemplateError> {
        let (name, extra) = match args {
            [name] => (name.display(), None),
            [name, vars] => (name.display(), Some(vars.to_value())),
            _ => return Err(render_error(template, line, "`include` takes 1 or 2 arguments")),
        };
        if self.depth >= MAX_INCLUDE_DEPTH {
            return Err(render_error(
                template,
                line,
                format!("`include` nested deeper than {MAX_INCLUDE_DEPTH} levels"),
            ));
        }

        let partial = match self.cache.handle(&name) {
            Ok(handle) => handle.item,
            Err(TemplateError::NotFound { name, .. }) => {
                return Err(TemplateError::NotFound {
                    name,
                    origin: Some(format!("{}:{line}", template.name)),
                });
            }
            Err(err) => return Err(err),
        };

        let frame = match extra {
            Some(Value::Object(map)) => map,
            Some(Value::Null) | None => Map::new(),
            Some(other) => {
                return Err(render_error(template, line, format!("`include` vars must be a map, got `{other}`")));
            }
        };

        self.depth += 1;
        self.scope.push(frame);
        let result = self.render(&partial);
        self.scope.pop();
        self.depth -= 1;
        result.map(Val::Html)
    }
}

fn render_error(template: &Template, line: usize, message: impl Into<String>) -> TemplateError {
    TemplateError::Render {
        name: template.name.clone(),
        line,
        message: message.into(),
    }
}
