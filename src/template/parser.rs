//! Template source → node tree.
//!
//! # Tags
//!
//! | Tag                     | Meaning                             |
//! |-------------------------|-------------------------------------|
//! | `<%= expr %>`           | output, HTML-escaped                |
//! | `<%== expr %>`          | output, verbatim                    |
//! | `<% if expr %>`         | conditional, closed by `<% end %>`  |
//! | `<% else %>`            | alternative branch of an `if`       |
//! | `<% for x in expr %>`   | loop, binds `x` and `loop_index`    |
//! | `<% end %>`             | closes the innermost block          |
//! | `<%# ... %>`            | comment, dropped                    |
//!
//! # Expressions
//!
//! ```text
//! expr    := and ("or" and)*
//! and     := compare ("and" compare)*
//! compare := unary (("==" | "!=") unary)?
//! unary   := "not" unary | primary
//! primary := string | integer | true | false | nil
//!          | "(" expr ")"
//!          | ident "(" [expr ("," expr)*] ")"
//!          | ident ("." (ident | integer))*
//! ```

const OPEN: &str = "<%";
const CLOSE: &str = "%>";

/// A compile failure at a 1-based source line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub line: usize,
    pub message: String,
}

impl ParseError {
    fn new(line: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Str(String),
    Int(i64),
    Bool(bool),
    Nil,
    /// `post.title`, `posts.0`
    Path(Vec<String>),
    Call(String, Vec<Expr>),
    Not(Box<Expr>),
    Eq(Box<Expr>, Box<Expr>),
    Ne(Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Text(String),
    Output {
        expr: Expr,
        escape: bool,
        line: usize,
    },
    If {
        cond: Expr,
        then: Vec<Node>,
        otherwise: Vec<Node>,
        line: usize,
    },
    For {
        var: String,
        iter: Expr,
        body: Vec<Node>,
        line: usize,
    },
}

// ============================================================================
// Block Structure
// ============================================================================

enum Open {
    Root,
    If(Expr),
    For(String, Expr),
}

struct Frame {
    open: Open,
    line: usize,
    nodes: Vec<Node>,
    /// `then` branch, once `else` has been seen.
    then: Option<Vec<Node>>,
}

impl Frame {
    fn new(open: Open, line: usize) -> Self {
        Self {
            open,
            line,
            nodes: Vec::new(),
            then: None,
        }
    }

    fn close(self) -> Node {
        match self.open {
            Open::If(cond) => {
                let (then, otherwise) = match self.then {
                    Some(then) => (then, self.nodes),
                    None => (self.nodes, Vec::new()),
                };
                Node::If {
                    cond,
                    then,
                    otherwise,
                    line: self.line,
                }
            }
            Open::For(var, iter) => Node::For {
                var,
                iter,
                body: self.nodes,
                line: self.line,
            },
            // Root is never closed by `end`.
            Open::Root => Node::Text(String::new()),
        }
    }

    fn keyword(&self) -> &'static str {
        match self.open {
            Open::Root => "template",
            Open::If(_) => "if",
            Open::For(..) => "for",
        }
    }
}

/// Parse a whole template.
pub fn parse(source: &str) -> Result<Vec<Node>, ParseError> {
    let mut stack = vec![Frame::new(Open::Root, 1)];
    let mut rest = source;
    let mut line = 1;

    while !rest.is_empty() {
        let Some(start) = rest.find(OPEN) else {
            push(&mut stack, Node::Text(rest.to_owned()));
            break;
        };
        if start > 0 {
            push(&mut stack, Node::Text(rest[..start].to_owned()));
            line += rest[..start].matches('\n').count();
        }

        let tag_line = line;
        let after = &rest[start + OPEN.len()..];
        let end = after
            .find(CLOSE)
            .ok_or_else(|| ParseError::new(tag_line, "unclosed `<%` tag"))?;
        let inner = &after[..end];
        line += inner.matches('\n').count();
        rest = &after[end + CLOSE.len()..];

        if let Some(expr) = inner.strip_prefix("==") {
            let expr = parse_expr(expr, tag_line)?;
            push(&mut stack, Node::Output { expr, escape: false, line: tag_line });
        } else if let Some(expr) = inner.strip_prefix('=') {
            let expr = parse_expr(expr, tag_line)?;
            push(&mut stack, Node::Output { expr, escape: true, line: tag_line });
        } else if inner.starts_with('#') {
            // comment
        } else {
            statement(&mut stack, inner.trim(), tag_line)?;
        }
    }

    if stack.len() > 1 {
        let open = &stack[stack.len() - 1];
        return Err(ParseError::new(
            open.line,
            format!("`{}` is never closed with `end`", open.keyword()),
        ));
    }
    Ok(stack.pop().map(|root| root.nodes).unwrap_or_default())
}

fn push(stack: &mut [Frame], node: Node) {
    if let Some(frame) = stack.last_mut() {
        frame.nodes.push(node);
    }
}

fn statement(stack: &mut Vec<Frame>, text: &str, line: usize) -> Result<(), ParseError> {
    let (keyword, rest) = text
        .split_once(char::is_whitespace)
        .map_or((text, ""), |(k, r)| (k, r.trim()));

    match keyword {
        "if" => {
            let cond = parse_expr(rest, line)?;
            stack.push(Frame::new(Open::If(cond), line));
        }
        "else" => {
            let frame = stack
                .last_mut()
                .filter(|f| matches!(f.open, Open::If(_)) && f.then.is_none())
                .ok_or_else(|| ParseError::new(line, "`else` outside of `if`"))?;
            frame.then = Some(std::mem::take(&mut frame.nodes));
        }
        "for" => {
            let (var, iter) = rest
                .split_once(" in ")
                .ok_or_else(|| ParseError::new(line, "expected `for <name> in <expr>`"))?;
            let var = var.trim();
            if !is_ident(var) {
                return Err(ParseError::new(line, format!("invalid loop variable `{var}`")));
            }
            let iter = parse_expr(iter, line)?;
            stack.push(Frame::new(Open::For(var.to_owned(), iter), line));
        }
        "end" => {
            if stack.len() < 2 {
                return Err(ParseError::new(line, "`end` without an open block"));
            }
            if let Some(frame) = stack.pop() {
                push(stack, frame.close());
            }
        }
        "" => return Err(ParseError::new(line, "empty tag")),
        other => return Err(ParseError::new(line, format!("unknown statement `{other}`"))),
    }
    Ok(())
}

fn is_ident(s: &str) -> bool {
    let mut chars = s.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

// ============================================================================
// Expressions
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Int(i64),
    Dot,
    Comma,
    LParen,
    RParen,
    EqEq,
    NotEq,
}

fn tokenize(src: &str, line: usize) -> Result<Vec<Token>, ParseError> {
    let chars: Vec<char> = src.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '.' => {
                tokens.push(Token::Dot);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '=' | '!' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(if c == '=' { Token::EqEq } else { Token::NotEq });
                i += 2;
            }
            '"' | '\'' => {
                let mut text = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        None => return Err(ParseError::new(line, "unterminated string")),
                        Some(&q) if q == c => break,
                        Some('\\') => {
                            let escaped = chars
                                .get(i + 1)
                                .ok_or_else(|| ParseError::new(line, "unterminated string"))?;
                            text.push(match escaped {
                                'n' => '\n',
                                't' => '\t',
                                other => *other,
                            });
                            i += 2;
                            continue;
                        }
                        Some(&other) => text.push(other),
                    }
                    i += 1;
                }
                tokens.push(Token::Str(text));
                i += 1;
            }
            c if c.is_ascii_digit() || (c == '-' && chars.get(i + 1).is_some_and(char::is_ascii_digit)) => {
                let start = i;
                i += 1;
                while chars.get(i).is_some_and(char::is_ascii_digit) {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let n = text
                    .parse()
                    .map_err(|_| ParseError::new(line, format!("integer out of range `{text}`")))?;
                tokens.push(Token::Int(n));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while chars.get(i).is_some_and(|c| c.is_ascii_alphanumeric() || *c == '_') {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            other => return Err(ParseError::new(line, format!("unexpected `{other}` in expression"))),
        }
    }
    Ok(tokens)
}

struct ExprParser {
    tokens: Vec<Token>,
    pos: usize,
    line: usize,
}

/// Parse one expression; trailing tokens are an error.
pub fn parse_expr(src: &str, line: usize) -> Result<Expr, ParseError> {
    let tokens = tokenize(src, line)?;
    if tokens.is_empty() {
        return Err(ParseError::new(line, "empty expression"));
    }
    let mut parser = ExprParser { tokens, pos: 0, line };
    let expr = parser.or()?;
    if let Some(token) = parser.peek() {
        return Err(parser.error(format!("unexpected {token:?} after expression")));
    }
    Ok(expr)
}

impl ExprParser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError::new(self.line, message)
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if matches!(self.peek(), Some(Token::Ident(word)) if word == keyword) {
            self.pos += 1;
            return true;
        }
        false
    }

    fn expect(&mut self, token: Token) -> Result<(), ParseError> {
        match self.next() {
            Some(t) if t == token => Ok(()),
            Some(t) => Err(self.error(format!("expected {token:?}, found {t:?}"))),
            None => Err(self.error(format!("expected {token:?} at end of expression"))),
        }
    }

    fn or(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.and()?;
        while self.eat_keyword("or") {
            left = Expr::Or(Box::new(left), Box::new(self.and()?));
        }
        Ok(left)
    }

    fn and(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.compare()?;
        while self.eat_keyword("and") {
            left = Expr::And(Box::new(left), Box::new(self.compare()?));
        }
        Ok(left)
    }

    fn compare(&mut self) -> Result<Expr, ParseError> {
        let left = self.unary()?;
        match self.peek() {
            Some(Token::EqEq) => {
                self.pos += 1;
                Ok(Expr::Eq(Box::new(left), Box::new(self.unary()?)))
            }
            Some(Token::NotEq) => {
                self.pos += 1;
                Ok(Expr::Ne(Box::new(left), Box::new(self.unary()?)))
            }
            _ => Ok(left),
        }
    }

    fn unary(&mut self) -> Result<Expr, ParseError> {
        if self.eat_keyword("not") {
            return Ok(Expr::Not(Box::new(self.unary()?)));
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Expr, ParseError> {
        match self.next() {
            Some(Token::Str(s)) => Ok(Expr::Str(s)),
            Some(Token::Int(n)) => Ok(Expr::Int(n)),
            Some(Token::LParen) => {
                let inner = self.or()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Some(Token::Ident(word)) => match word.as_str() {
                "true" => Ok(Expr::Bool(true)),
                "false" => Ok(Expr::Bool(false)),
                "nil" => Ok(Expr::Nil),
                "not" | "and" | "or" => Err(self.error(format!("unexpected `{word}`"))),
                _ if self.peek() == Some(&Token::LParen) => {
                    self.pos += 1;
                    let args = self.args()?;
                    Ok(Expr::Call(word, args))
                }
                _ => self.path(word),
            },
            Some(token) => Err(self.error(format!("unexpected {token:?}"))),
            None => Err(self.error("unexpected end of expression")),
        }
    }

    fn args(&mut self) -> Result<Vec<Expr>, ParseError> {
        let mut args = Vec::new();
        if self.peek() == Some(&Token::RParen) {
            self.pos += 1;
            return Ok(args);
        }
        loop {
            args.push(self.or()?);
            match self.next() {
                Some(Token::Comma) => continue,
                Some(Token::RParen) => return Ok(args),
                _ => return Err(self.error("expected `,` or `)` in argument list")),
            }
        }
    }

    fn path(&mut self, head: String) -> Result<Expr, ParseError> {
        let mut segments = vec![head];
        while self.peek() == Some(&Token::Dot) {
            self.pos += 1;
            match self.next() {
                Some(Token::Ident(name)) => segments.push(name),
                Some(Token::Int(n)) if n >= 0 => segments.push(n.to_string()),
                _ => return Err(self.error("expected a name or index after `.`")),
            }
        }
        Ok(Expr::Path(segments))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(s: &str) -> Expr {
        Expr::Path(s.split('.').map(str::to_owned).collect())
    }

    #[test]
    fn test_text_and_outputs() {
        let nodes = parse("Hello <%= name %>, <%== body %>!").unwrap();
        assert_eq!(
            nodes,
            vec![
                Node::Text("Hello ".into()),
                Node::Output { expr: path("name"), escape: true, line: 1 },
                Node::Text(", ".into()),
                Node::Output { expr: path("body"), escape: false, line: 1 },
                Node::Text("!".into()),
            ]
        );
    }

    #[test]
    fn test_comment_dropped() {
        let nodes = parse("a<%# ignore me %>b").unwrap();
        assert_eq!(nodes, vec![Node::Text("a".into()), Node::Text("b".into())]);
    }

    #[test]
    fn test_if_else() {
        let nodes = parse("<% if post.title %>T<% else %>U<% end %>").unwrap();
        assert_eq!(
            nodes,
            vec![Node::If {
                cond: path("post.title"),
                then: vec![Node::Text("T".into())],
                otherwise: vec![Node::Text("U".into())],
                line: 1,
            }]
        );
    }

    #[test]
    fn test_for_nested_with_lines() {
        let src = "<ul>\n<% for post in posts %>\n<% if not post.draft %><li><%= post.title %></li><% end %>\n<% end %>\n</ul>";
        let nodes = parse(src).unwrap();
        let Node::For { var, iter, body, line } = &nodes[1] else {
            panic!("expected a for node: {nodes:?}");
        };
        assert_eq!(var, "post");
        assert_eq!(iter, &path("posts"));
        assert_eq!(*line, 2);
        assert!(matches!(body[1], Node::If { line: 3, .. }));
    }

    #[test]
    fn test_unclosed_block_reports_open_line() {
        let err = parse("a\n<% if x %>\nb").unwrap_err();
        assert_eq!(err.line, 2);
        assert!(err.message.contains("never closed"));
    }

    #[test]
    fn test_structure_errors() {
        assert_eq!(parse("x\n\n<% end %>").unwrap_err().line, 3);
        assert!(parse("<% else %>").is_err());
        assert!(parse("<% if a %><% else %><% else %><% end %>").is_err());
        assert!(parse("<% while x %>").is_err());
        assert!(parse("<% for 1x in y %><% end %>").is_err());
        assert!(parse("<%= x").is_err());
    }

    #[test]
    fn test_expressions() {
        assert_eq!(
            parse_expr("link_to(post.title, 'a\\'b', 3)", 1).unwrap(),
            Expr::Call(
                "link_to".into(),
                vec![path("post.title"), Expr::Str("a'b".into()), Expr::Int(3)]
            )
        );
        assert_eq!(parse_expr("posts.0.title", 1).unwrap(), path("posts.0.title"));
        assert_eq!(
            parse_expr("not a == b", 1).unwrap(),
            Expr::Eq(Box::new(Expr::Not(Box::new(path("a")))), Box::new(path("b")))
        );
        assert_eq!(
            parse_expr("a or b and c", 1).unwrap(),
            Expr::Or(
                Box::new(path("a")),
                Box::new(Expr::And(Box::new(path("b")), Box::new(path("c"))))
            )
        );
        assert_eq!(
            parse_expr("x != nil", 1).unwrap(),
            Expr::Ne(Box::new(path("x")), Box::new(Expr::Nil))
        );
        assert_eq!(parse_expr("f()", 1).unwrap(), Expr::Call("f".into(), vec![]));
        assert_eq!(parse_expr("-5", 1).unwrap(), Expr::Int(-5));
    }

    #[test]
    fn test_expression_errors() {
        for bad in ["", "a b", "f(a", "'open", "a.", "a == ", "a + b", "and"] {
            assert!(parse_expr(bad, 4).is_err(), "`{bad}` should not parse");
        }
        assert_eq!(parse_expr("a b", 4).unwrap_err().line, 4);
    }
}
