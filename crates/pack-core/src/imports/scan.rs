//! Import scanner.
//!
//! Splits JavaScript source into [`Fragment`]s without building an AST.
//! Comments, string literals, template literals (including nested `${}`
//! expressions) and regular expression literals are skipped so import-like
//! text inside them is never picked up. Keywords only count on a word
//! boundary and not as a property (`obj.require(..)`).

use super::fragment::{
    Binding, BindingKind, ExportKind, ExportNode, Fragment, ImportKind, ImportNode,
};

/// Outcome of scanning one module.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanResult {
    pub fragments: Vec<Fragment>,
    /// Saw `import`/`export` syntax or `import.meta`. Dynamic `import()` does not count.
    pub is_esm: bool,
    /// Names assigned through `exports.x =` or `module.exports.x =`.
    pub cjs_exports: Vec<String>,
}

impl ScanResult {
    /// Module has no ES module syntax and is treated as CommonJS.
    #[must_use]
    pub fn is_commonjs(&self) -> bool {
        !self.is_esm
    }

    /// Import fragments in source order.
    pub fn imports(&self) -> impl Iterator<Item = &ImportNode> {
        self.fragments.iter().filter_map(Fragment::as_import)
    }
}

/// Scan `source` into fragments.
#[must_use]
pub fn scan_module(source: &str) -> ScanResult {
    Scanner::new(source).run()
}

/// Keywords after which a `/` starts a regular expression.
const REGEX_KEYWORDS: &[&str] = &[
    "return", "typeof", "instanceof", "in", "of", "new", "delete", "void", "throw", "case", "do",
    "else", "yield", "await",
];

/// Last significant token, for telling a regex literal from a division.
#[derive(Debug, Clone, Copy)]
enum Prev {
    None,
    Punct(u8),
    Word(usize, usize),
    Value,
}

struct Scanner<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
    chunk_start: usize,
    prev: Prev,
    out: ScanResult,
}

impl<'a> Scanner<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src,
            bytes: src.as_bytes(),
            pos: 0,
            chunk_start: 0,
            prev: Prev::None,
            out: ScanResult::default(),
        }
    }

    fn run(mut self) -> ScanResult {
        let len = self.bytes.len();
        while self.pos < len {
            let c = self.bytes[self.pos];
            match c {
                b'/' => match self.bytes.get(self.pos + 1) {
                    Some(b'/' | b'*') => {
                        let end = skip_comment(self.bytes, self.pos);
                        let comment = Fragment::Comment(self.src[self.pos..end].to_string());
                        self.emit(self.pos, end, comment);
                    }
                    _ => {
                        if self.regex_allowed() {
                            if let Some(end) = skip_regex(self.bytes, self.pos) {
                                self.pos = end;
                                self.prev = Prev::Value;
                                continue;
                            }
                        }
                        self.prev = Prev::Punct(c);
                        self.pos += 1;
                    }
                },
                b'\'' | b'"' => {
                    self.pos = skip_string(self.bytes, self.pos);
                    self.prev = Prev::Value;
                }
                b'`' => {
                    self.pos = skip_template(self.bytes, self.pos);
                    self.prev = Prev::Value;
                }
                c if is_ident_start(c) => {
                    let end = ident_end(self.bytes, self.pos);
                    self.keyword(self.pos, end);
                }
                c if c.is_ascii_digit() => {
                    while self.pos < len
                        && (is_ident_part(self.bytes[self.pos]) || self.bytes[self.pos] == b'.')
                    {
                        self.pos += 1;
                    }
                    self.prev = Prev::Value;
                }
                c if c.is_ascii_whitespace() => self.pos += 1,
                _ => {
                    self.prev = Prev::Punct(c);
                    self.pos += 1;
                }
            }
        }
        self.flush(len);
        self.out
    }

    /// Handle the word at `start..end`.
    fn keyword(&mut self, start: usize, end: usize) {
        let word = &self.src[start..end];
        let is_property = preceded_by_dot(self.bytes, start);

        if !is_property {
            match word {
                "import" => {
                    if let Some((node, stmt_end)) = self.parse_import(start, end) {
                        let dynamic = node.kind == ImportKind::Dynamic;
                        self.out.is_esm |= !dynamic;
                        self.emit(start, stmt_end, Fragment::Import(node));
                        self.prev = if dynamic { Prev::Value } else { Prev::Punct(b';') };
                        return;
                    }
                    if self.byte(skip_trivia(self.bytes, end)) == Some(b'.') {
                        // import.meta
                        self.out.is_esm = true;
                    }
                }
                "export" => {
                    self.out.is_esm = true;
                    if let Some((node, stmt_end)) = self.parse_reexport(start, end) {
                        self.emit(start, stmt_end, Fragment::Import(node));
                        self.prev = Prev::Punct(b';');
                        return;
                    }
                    if let Some((node, stmt_end)) = self.parse_export(start, end) {
                        self.emit(start, stmt_end, Fragment::Export(node));
                        self.prev = Prev::Punct(b';');
                        return;
                    }
                }
                "require" => {
                    if let Some((node, call_end)) = self.parse_require(start, end) {
                        self.emit(start, call_end, Fragment::Import(node));
                        self.prev = Prev::Value;
                        return;
                    }
                }
                "module" | "exports" => self.note_commonjs_export(word, end),
                _ => {}
            }
        }

        self.pos = end;
        self.prev = Prev::Word(start, end);
    }

    fn regex_allowed(&self) -> bool {
        match self.prev {
            Prev::None => true,
            Prev::Punct(c) => !matches!(c, b')' | b']'),
            Prev::Word(s, e) => REGEX_KEYWORDS.contains(&&self.src[s..e]),
            Prev::Value => false,
        }
    }

    fn byte(&self, i: usize) -> Option<u8> {
        self.bytes.get(i).copied()
    }

    fn flush(&mut self, until: usize) {
        if until > self.chunk_start {
            let code = self.src[self.chunk_start..until].to_string();
            self.out.fragments.push(Fragment::Code(code));
        }
        self.chunk_start = until;
    }

    fn emit(&mut self, start: usize, end: usize, fragment: Fragment) {
        self.flush(start);
        self.out.fragments.push(fragment);
        self.pos = end;
        self.chunk_start = end;
    }

    fn parse_import(&self, start: usize, kw_end: usize) -> Option<(ImportNode, usize)> {
        let mut i = skip_trivia(self.bytes, kw_end);
        match self.byte(i)? {
            b'(' => {
                i = skip_trivia(self.bytes, i + 1);
                let (path, j) = self.string_literal(i)?;
                let j = skip_trivia(self.bytes, j);
                if self.byte(j)? != b')' {
                    return None;
                }
                let code = &self.src[start..=j];
                Some((ImportNode::new(ImportKind::Dynamic, code, path), j + 1))
            }
            b'.' => None,
            b'\'' | b'"' => {
                let (path, j) = self.string_literal(i)?;
                let end = self.statement_end(j);
                let code = &self.src[start..end];
                Some((ImportNode::new(ImportKind::Static, code, path), end))
            }
            _ => {
                let (bindings, j) = self.import_clause(i)?;
                i = skip_trivia(self.bytes, j);
                if !word_at(self.bytes, i, "from") {
                    return None;
                }
                i = skip_trivia(self.bytes, i + 4);
                let (path, j) = self.string_literal(i)?;
                let end = self.statement_end(j);
                let node = ImportNode::new(ImportKind::Static, &self.src[start..end], path)
                    .with_bindings(bindings);
                Some((node, end))
            }
        }
    }

    /// `x`, `x, { a }`, `x, * as ns`, `* as ns`, `{ a, b as c }`.
    fn import_clause(&self, mut i: usize) -> Option<(Vec<Binding>, usize)> {
        let mut bindings = Vec::new();

        if let Some((name, j)) = self.identifier(i) {
            bindings.push(Binding::new(BindingKind::Default, name, None));
            i = skip_trivia(self.bytes, j);
            if self.byte(i) != Some(b',') {
                return Some((bindings, i));
            }
            i = skip_trivia(self.bytes, i + 1);
        }

        match self.byte(i)? {
            b'*' => {
                i = skip_trivia(self.bytes, i + 1);
                if !word_at(self.bytes, i, "as") {
                    return None;
                }
                let (alias, j) = self.identifier(skip_trivia(self.bytes, i + 2))?;
                bindings.push(Binding::new(BindingKind::Namespace, "*", Some(alias)));
                Some((bindings, j))
            }
            b'{' => {
                let (items, j) = self.named_list(i)?;
                bindings.extend(items.into_iter().map(named_binding));
                Some((bindings, j))
            }
            _ => None,
        }
    }

    /// `{ a, b as c, 'str' as d }` starting at the `{`.
    #[allow(clippy::type_complexity)]
    fn named_list(&self, mut i: usize) -> Option<(Vec<(String, Option<String>)>, usize)> {
        let mut items = Vec::new();
        i += 1;
        loop {
            i = skip_trivia(self.bytes, i);
            if self.byte(i)? == b'}' {
                return Some((items, i + 1));
            }
            let (name, j) = self.name_or_string(i)?;
            i = skip_trivia(self.bytes, j);
            let mut alias = None;
            if word_at(self.bytes, i, "as") {
                let (a, j) = self.name_or_string(skip_trivia(self.bytes, i + 2))?;
                alias = Some(a);
                i = skip_trivia(self.bytes, j);
            }
            items.push((name, alias));
            match self.byte(i)? {
                b',' => i += 1,
                b'}' => return Some((items, i + 1)),
                _ => return None,
            }
        }
    }

    fn parse_reexport(&self, start: usize, kw_end: usize) -> Option<(ImportNode, usize)> {
        let mut i = skip_trivia(self.bytes, kw_end);
        let bindings = match self.byte(i)? {
            b'*' => {
                i = skip_trivia(self.bytes, i + 1);
                if word_at(self.bytes, i, "as") {
                    let (alias, j) = self.name_or_string(skip_trivia(self.bytes, i + 2))?;
                    i = skip_trivia(self.bytes, j);
                    vec![Binding::new(BindingKind::Namespace, "*", Some(alias))]
                } else {
                    vec![Binding::new(BindingKind::Namespace, "*", None)]
                }
            }
            b'{' => {
                let (items, j) = self.named_list(i)?;
                i = skip_trivia(self.bytes, j);
                items.into_iter().map(named_binding).collect()
            }
            _ => return None,
        };

        if !word_at(self.bytes, i, "from") {
            return None;
        }
        let (path, j) = self.string_literal(skip_trivia(self.bytes, i + 4))?;
        let end = self.statement_end(j);
        let node = ImportNode::new(ImportKind::ReExport, &self.src[start..end], path)
            .with_bindings(bindings);
        Some((node, end))
    }

    fn parse_export(&self, start: usize, kw_end: usize) -> Option<(ExportNode, usize)> {
        let i = skip_trivia(self.bytes, kw_end);
        let prefix = |until: usize| self.src[start..until].to_string();

        if word_at(self.bytes, i, "default") {
            let decl = skip_trivia(self.bytes, i + 7);
            let kind = match self.declaration_name(decl) {
                Some(name) => ExportKind::DefaultDeclaration(name),
                None => ExportKind::DefaultExpression,
            };
            return Some((
                ExportNode {
                    kind,
                    code: prefix(decl),
                },
                decl,
            ));
        }

        for keyword in ["const", "let", "var"] {
            if word_at(self.bytes, i, keyword) {
                let names = self.declarator_names(i + keyword.len());
                return Some((
                    ExportNode {
                        kind: ExportKind::Declaration(names),
                        code: prefix(i),
                    },
                    i,
                ));
            }
        }

        if let Some(name) = self.declaration_name(i) {
            return Some((
                ExportNode {
                    kind: ExportKind::Declaration(vec![name]),
                    code: prefix(i),
                },
                i,
            ));
        }

        if self.byte(i)? == b'{' {
            let (items, j) = self.named_list(i)?;
            let end = self.statement_end(j);
            let pairs = items
                .into_iter()
                .map(|(local, alias)| {
                    let exported = alias.unwrap_or_else(|| local.clone());
                    (local, exported)
                })
                .collect();
            return Some((
                ExportNode {
                    kind: ExportKind::List(pairs),
                    code: prefix(end),
                },
                end,
            ));
        }

        None
    }

    /// Name of a `function`/`class` declaration starting at `i`.
    fn declaration_name(&self, i: usize) -> Option<String> {
        let mut k = i;
        if word_at(self.bytes, k, "async") {
            k = skip_trivia(self.bytes, k + 5);
        }
        let keyword_len = if word_at(self.bytes, k, "function") {
            8
        } else if word_at(self.bytes, k, "class") {
            5
        } else {
            return None;
        };
        k = skip_trivia(self.bytes, k + keyword_len);
        if self.byte(k) == Some(b'*') {
            k = skip_trivia(self.bytes, k + 1);
        }
        let (name, _) = self.identifier(k)?;
        (name != "extends").then_some(name)
    }

    /// Bound names of `a = 1, { b, c: d } = o, [e] = arr`.
    fn declarator_names(&self, from: usize) -> Vec<String> {
        let mut names = Vec::new();
        let mut i = skip_trivia(self.bytes, from);
        loop {
            match self.byte(i) {
                Some(b'{' | b'[') => {
                    let end = skip_balanced(self.bytes, i);
                    pattern_names(&self.src[i..end], &mut names);
                    i = end;
                }
                _ => match self.identifier(i) {
                    Some((name, j)) => {
                        names.push(name);
                        i = j;
                    }
                    None => break,
                },
            }
            i = skip_initializer(self.bytes, i);
            if self.byte(i) != Some(b',') {
                break;
            }
            i = skip_trivia(self.bytes, i + 1);
        }
        names
    }

    fn parse_require(&self, start: usize, kw_end: usize) -> Option<(ImportNode, usize)> {
        let mut i = skip_trivia(self.bytes, kw_end);
        if self.byte(i)? != b'(' {
            return None;
        }
        i = skip_trivia(self.bytes, i + 1);
        let (path, j) = self.string_literal(i)?;
        let j = skip_trivia(self.bytes, j);
        if self.byte(j)? != b')' {
            return None;
        }
        let code = &self.src[start..=j];
        Some((ImportNode::new(ImportKind::Require, code, path), j + 1))
    }

    /// Record `exports.x =` and `module.exports.x =` assignments.
    fn note_commonjs_export(&mut self, word: &str, end: usize) {
        let mut i = skip_trivia(self.bytes, end);
        if word == "module" {
            if self.byte(i) != Some(b'.') {
                return;
            }
            i = skip_trivia(self.bytes, i + 1);
            if !word_at(self.bytes, i, "exports") {
                return;
            }
            i = skip_trivia(self.bytes, i + 7);
        }
        if self.byte(i) != Some(b'.') {
            return;
        }
        let Some((name, j)) = self.identifier(skip_trivia(self.bytes, i + 1)) else {
            return;
        };
        let j = skip_trivia(self.bytes, j);
        if self.byte(j) == Some(b'=') && self.byte(j + 1) != Some(b'=')
            && !self.out.cjs_exports.contains(&name)
        {
            self.out.cjs_exports.push(name);
        }
    }

    /// Consume an optional `;` on the same line.
    fn statement_end(&self, mut i: usize) -> usize {
        while matches!(self.byte(i), Some(b' ' | b'\t')) {
            i += 1;
        }
        if self.byte(i) == Some(b';') {
            i + 1
        } else {
            i
        }
    }

    fn identifier(&self, i: usize) -> Option<(String, usize)> {
        if !is_ident_start(self.byte(i)?) {
            return None;
        }
        let end = ident_end(self.bytes, i);
        Some((self.src[i..end].to_string(), end))
    }

    fn name_or_string(&self, i: usize) -> Option<(String, usize)> {
        self.identifier(i).or_else(|| self.string_literal(i))
    }

    /// A quoted literal without escapes or interpolation.
    fn string_literal(&self, i: usize) -> Option<(String, usize)> {
        let quote = self.byte(i)?;
        if !matches!(quote, b'\'' | b'"' | b'`') {
            return None;
        }
        let mut j = i + 1;
        while let Some(c) = self.byte(j) {
            if c == quote {
                return Some((self.src[i + 1..j].to_string(), j + 1));
            }
            if c == b'\\' || c == b'\n' || (quote == b'`' && c == b'$') {
                return None;
            }
            j += 1;
        }
        None
    }
}

fn named_binding((name, alias): (String, Option<String>)) -> Binding {
    let kind = if name == "default" {
        BindingKind::Default
    } else {
        BindingKind::Named
    };
    Binding::new(kind, name, alias)
}

/// Collect identifiers bound by a destructuring pattern (including its brackets).
fn pattern_names(pattern: &str, out: &mut Vec<String>) {
    let is_object = pattern.starts_with('{');
    let inner = &pattern[1..pattern.len().saturating_sub(1).max(1)];
    for part in split_top_level(inner, b',') {
        let mut target = part.trim().trim_start_matches("...").trim();
        if is_object {
            if let Some(colon) = find_top_level(target, b':') {
                target = target[colon + 1..].trim();
            }
        }
        if let Some(eq) = find_top_level(target, b'=') {
            target = target[..eq].trim();
        }
        if target.starts_with('{') || target.starts_with('[') {
            pattern_names(target, out);
        } else if !target.is_empty() && target.bytes().all(is_ident_part) {
            out.push(target.to_string());
        }
    }
}

fn split_top_level(s: &str, sep: u8) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut rest = s;
    while let Some(i) = find_top_level(rest, sep) {
        parts.push(&rest[..i]);
        rest = &rest[i + 1..];
    }
    parts.push(rest);
    parts
}

fn find_top_level(s: &str, needle: u8) -> Option<usize> {
    let b = s.as_bytes();
    let mut depth = 0usize;
    let mut i = 0;
    while i < b.len() {
        match b[i] {
            b'\'' | b'"' => {
                i = skip_string(b, i);
                continue;
            }
            b'`' => {
                i = skip_template(b, i);
                continue;
            }
            b'(' | b'[' | b'{' => depth += 1,
            b')' | b']' | b'}' => depth = depth.saturating_sub(1),
            c if c == needle && depth == 0 => {
                // `=>` and `==` are not assignments
                if needle != b'=' || !matches!(b.get(i + 1), Some(b'=' | b'>')) {
                    return Some(i);
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}

fn is_ident_start(c: u8) -> bool {
    c.is_ascii_alphabetic() || c == b'_' || c == b'$' || c >= 0x80
}

fn is_ident_part(c: u8) -> bool {
    is_ident_start(c) || c.is_ascii_digit()
}

fn ident_end(b: &[u8], mut i: usize) -> usize {
    while i < b.len() && is_ident_part(b[i]) {
        i += 1;
    }
    i
}

/// Word at `i` equals `word` and is not a prefix of a longer identifier.
fn word_at(b: &[u8], i: usize, word: &str) -> bool {
    let end = i + word.len();
    b.get(i..end) == Some(word.as_bytes()) && b.get(end).map_or(true, |&c| !is_ident_part(c))
}

/// Whether the token before `i` is a member-access dot (and not a spread).
fn preceded_by_dot(b: &[u8], i: usize) -> bool {
    let mut j = i;
    while j > 0 && b[j - 1].is_ascii_whitespace() {
        j -= 1;
    }
    j > 0 && b[j - 1] == b'.' && !(j > 2 && b[j - 2] == b'.' && b[j - 3] == b'.')
}

/// Skip whitespace and comments.
fn skip_trivia(b: &[u8], mut i: usize) -> usize {
    loop {
        while i < b.len() && b[i].is_ascii_whitespace() {
            i += 1;
        }
        if i + 1 < b.len() && b[i] == b'/' && matches!(b[i + 1], b'/' | b'*') {
            i = skip_comment(b, i);
        } else {
            return i;
        }
    }
}

/// End of the comment starting at `i`. Line comments stop before the newline.
fn skip_comment(b: &[u8], i: usize) -> usize {
    if b.get(i + 1) == Some(&b'/') {
        b[i..]
            .iter()
            .position(|&c| c == b'\n')
            .map_or(b.len(), |p| i + p)
    } else {
        b[i + 2..]
            .windows(2)
            .position(|w| w == b"*/")
            .map_or(b.len(), |p| i + 2 + p + 2)
    }
}

/// End of the string literal starting at `i`. Unterminated strings end at the newline.
fn skip_string(b: &[u8], i: usize) -> usize {
    let quote = b[i];
    let mut j = i + 1;
    while j < b.len() {
        match b[j] {
            b'\\' => j += 2,
            b'\n' => return j,
            c if c == quote => return j + 1,
            _ => j += 1,
        }
    }
    b.len()
}

/// End of the template literal starting at `i`, nested `${}` included.
fn skip_template(b: &[u8], i: usize) -> usize {
    let mut j = i + 1;
    while j < b.len() {
        match b[j] {
            b'\\' => j += 2,
            b'`' => return j + 1,
            b'$' if b.get(j + 1) == Some(&b'{') => j = skip_balanced(b, j + 1),
            _ => j += 1,
        }
    }
    b.len()
}

/// Position after the bracket matching the one at `i`.
fn skip_balanced(b: &[u8], i: usize) -> usize {
    let mut depth = 0usize;
    let mut j = i;
    while j < b.len() {
        match b[j] {
            b'\'' | b'"' => {
                j = skip_string(b, j);
                continue;
            }
            b'`' => {
                j = skip_template(b, j);
                continue;
            }
            b'/' if matches!(b.get(j + 1), Some(b'/' | b'*')) => {
                j = skip_comment(b, j);
                continue;
            }
            b'(' | b'[' | b'{' => depth += 1,
            b')' | b']' | b'}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return j + 1;
                }
            }
            _ => {}
        }
        j += 1;
    }
    b.len()
}

/// End of the regex literal starting at `i`, flags included.
fn skip_regex(b: &[u8], i: usize) -> Option<usize> {
    let mut j = i + 1;
    let mut in_class = false;
    while j < b.len() {
        match b[j] {
            b'\\' => j += 1,
            b'\n' => return None,
            b'[' => in_class = true,
            b']' => in_class = false,
            b'/' if !in_class => {
                if j == i + 1 {
                    return None;
                }
                return Some(ident_end(b, j + 1));
            }
            _ => {}
        }
        j += 1;
    }
    None
}

/// Skip a declarator's initializer up to the `,` or end of the declaration.
fn skip_initializer(b: &[u8], mut i: usize) -> usize {
    let mut last_significant = 0u8;
    while i < b.len() {
        match b[i] {
            b'\'' | b'"' => {
                i = skip_string(b, i);
                last_significant = b'"';
                continue;
            }
            b'`' => {
                i = skip_template(b, i);
                last_significant = b'`';
                continue;
            }
            b'/' if matches!(b.get(i + 1), Some(b'/' | b'*')) => {
                i = skip_comment(b, i);
                continue;
            }
            b'(' | b'[' | b'{' => {
                i = skip_balanced(b, i);
                last_significant = b')';
                continue;
            }
            b',' | b';' | b')' | b']' | b'}' => return i,
            b'\n' => {
                let next = skip_trivia(b, i);
                let continues = matches!(
                    last_significant,
                    b'=' | b',' | b'+' | b'-' | b'*' | b'/' | b'?' | b':' | b'&' | b'|' | b'.'
                ) || matches!(
                    b.get(next),
                    Some(b',' | b'.' | b'?' | b':' | b'+' | b'*' | b'&' | b'|' | b'=')
                );
                if !continues {
                    return i;
                }
            }
            c if !c.is_ascii_whitespace() => last_significant = c,
            _ => {}
        }
        i += 1;
    }
    i
}
