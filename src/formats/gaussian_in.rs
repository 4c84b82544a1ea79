// SPDX-License-Identifier: BSD-3-Clause
// Copyright (c) 2025 William Bro-Jørgensen
// Copyright (c) 2020 Guillaume Fraux and contributors
//
// See LICENSE at the project root for full text.

//! Reader, editor and writer for a single Gaussian job (`.gjf`/`.com`).
//!
//! A job is laid out as
//!
//! ```text
//! %chk=water.chk          link0 directives
//! #p opt b3lyp/6-31g(d)   route section, up to a blank line
//!
//! water optimisation      title section, up to a blank line
//!
//! 0 1                     charge and multiplicity
//! O  0.000  0.000  0.119  molecule specification, up to a blank line
//! H  0.000  0.763 -0.477
//! H  0.000 -0.763 -0.477
//!
//! ...                     anything else (basis sets, constraints) kept as is
//! ```
//!
//! Parsed jobs remember the text each section was read from. When a job is
//! written back, unchanged sections are copied from that text and edited
//! sections are regenerated, so an unedited job round-trips byte for byte.

use crate::atom::Atom;
use crate::error::CError;
use crate::format::{FileFormat, WriteFormat};
use crate::formats::gaussian_out::GaussianOut;
use crate::geometry::GeometrySnapshot;
use crate::periodic;
use std::fmt;

const FORMAT: &str = "Gaussian input";

/// Link0 (`%key=value`) directives, in file order. Keys are matched
/// case-insensitively, as Gaussian does.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Link0 {
    entries: Vec<(String, String)>,
}

impl Link0 {
    pub fn new() -> Self {
        Link0::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Value of the directive `key`; bare directives such as `%NoSave` have an
    /// empty value.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// Sets `key` to `value`, in place if the directive already exists.
    pub fn set(&mut self, key: &str, value: &str) {
        match self
            .entries
            .iter_mut()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
        {
            Some(entry) => entry.1 = value.to_string(),
            None => self.entries.push((key.to_string(), value.to_string())),
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        let index = self
            .entries
            .iter()
            .position(|(k, _)| k.eq_ignore_ascii_case(key))?;
        Some(self.entries.remove(index).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    fn parse_line(lineno: usize, line: &str) -> Result<(String, String), CError> {
        let directive = line.trim().trim_start_matches('%');
        let (key, value) = directive.split_once('=').unwrap_or((directive, ""));
        if key.trim().is_empty() {
            return Err(CError::format(
                FORMAT,
                lineno,
                format!("empty link0 directive '{}'", line.trim()),
            ));
        }
        Ok((key.trim().to_string(), value.trim().to_string()))
    }
}

/// Where Gaussian takes the molecule from, as requested by the route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeometrySource {
    /// The molecule specification follows the charge and multiplicity.
    Inline,
    /// `geom=check`: only charge and multiplicity are given.
    Checkpoint,
    /// `geom=allcheck`: title, charge and molecule all come from the
    /// checkpoint file.
    AllCheck,
}

/// The route section: a print-level prefix (`#`, `#p`, `#n` or `#t`) and
/// the keywords, with their original spelling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub prefix: String,
    pub keywords: Vec<String>,
}

/// Name a keyword is matched by: `opt` for `opt=(ts,calcfc)`, `b3lyp` for
/// `b3lyp/6-31g(d)`.
fn keyword_name(token: &str) -> &str {
    let end = token.find(['=', '(', '/']).unwrap_or(token.len());
    &token[..end]
}

/// Splits on whitespace outside of parentheses, so that
/// `scf=(xqc, maxcycle=128)` stays one keyword.
fn split_keywords(text: &str) -> Vec<String> {
    let mut keywords = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    for c in text.chars() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            _ => {}
        }
        if c.is_whitespace() && depth == 0 {
            if !current.is_empty() {
                keywords.push(std::mem::take(&mut current));
            }
        } else {
            current.push(c);
        }
    }
    if !current.is_empty() {
        keywords.push(current);
    }
    keywords
}

impl Route {
    pub fn new(prefix: &str, keywords: &[&str]) -> Self {
        Route {
            prefix: prefix.to_string(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
        }
    }

    /// Parses a route section, possibly joined from several lines.
    ///
    /// # Errors
    ///
    /// Returns an error if the text does not start with `#`.
    pub fn parse(text: &str) -> Result<Self, CError> {
        let mut tokens = split_keywords(text).into_iter();
        let first = tokens.next().filter(|t| t.starts_with('#')).ok_or(
            CError::MissingSection {
                format: FORMAT,
                section: "route",
            },
        )?;

        let mut keywords = Vec::new();
        let prefix = match first.to_lowercase().as_str() {
            "#" | "#p" | "#n" | "#t" => first,
            _ => {
                // `#opt` is the `#` prefix glued to a keyword
                keywords.push(first[1..].to_string());
                "#".to_string()
            }
        };
        keywords.extend(tokens);
        Ok(Route { prefix, keywords })
    }

    pub fn has_keyword(&self, name: &str) -> bool {
        self.keyword(name).is_some()
    }

    /// The full keyword whose name is `name`, ignoring case.
    pub fn keyword(&self, name: &str) -> Option<&str> {
        self.keywords
            .iter()
            .find(|k| keyword_name(k).eq_ignore_ascii_case(name))
            .map(String::as_str)
    }

    /// Replaces the keyword with the same name as `keyword`, or appends it.
    pub fn set_keyword(&mut self, keyword: &str) {
        let name = keyword_name(keyword);
        match self
            .keywords
            .iter_mut()
            .find(|k| keyword_name(k).eq_ignore_ascii_case(name))
        {
            Some(existing) => *existing = keyword.to_string(),
            None => self.keywords.push(keyword.to_string()),
        }
    }

    pub fn remove_keyword(&mut self, name: &str) -> Option<String> {
        let index = self
            .keywords
            .iter()
            .position(|k| keyword_name(k).eq_ignore_ascii_case(name))?;
        Some(self.keywords.remove(index))
    }

    pub fn geometry_source(&self) -> GeometrySource {
        let options = self
            .keyword("geom")
            .or_else(|| self.keyword("geometry"))
            .map(str::to_lowercase)
            .unwrap_or_default();
        if options.contains("allcheck") || self.has_keyword("allcheck") {
            GeometrySource::AllCheck
        } else if options.contains("check") {
            GeometrySource::Checkpoint
        } else {
            GeometrySource::Inline
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.prefix)?;
        for keyword in &self.keywords {
            write!(f, " {keyword}")?;
        }
        Ok(())
    }
}

/// Optimization flag written between the element and the coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FreezeFlag {
    Free,
    Frozen,
}

impl FreezeFlag {
    pub fn code(self) -> i32 {
        match self {
            FreezeFlag::Free => 0,
            FreezeFlag::Frozen => -1,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(FreezeFlag::Free),
            -1 => Some(FreezeFlag::Frozen),
            _ => None,
        }
    }
}

/// Text of the parsed deck, with the values each section held when read.
#[derive(Debug, Clone, PartialEq)]
struct Layout {
    leading: Vec<String>,
    link0: (Link0, Vec<String>),
    route: (Route, Vec<String>),
    route_end: String,
    /// Absent for `geom=allcheck` jobs, which stop after the route.
    body: Option<BodyLayout>,
}

/// Title, charge line and molecule block as they were read.
#[derive(Debug, Clone, PartialEq)]
struct BodyLayout {
    title: (String, Vec<String>),
    title_end: String,
    charge: ((i32, u32), String),
    atoms: Vec<(Atom, Option<FreezeFlag>, String)>,
    /// `None` when the text ended right after the molecule.
    molecule_end: Option<String>,
}

/// One Gaussian job.
///
/// Every field may be edited freely; values are only checked again when the
/// job is written.
#[derive(Debug, Clone, PartialEq)]
pub struct GaussianIn {
    pub link0: Link0,
    pub route: Route,
    /// Title section; several lines are joined with `\n`.
    pub title: String,
    pub charge: i32,
    pub multiplicity: u32,
    pub molecule: GeometrySnapshot,
    /// Per-atom optimization flags, either empty or one per atom.
    pub freeze: Vec<Option<FreezeFlag>>,
    /// Everything after the molecule specification, verbatim.
    pub trailing: String,
    layout: Option<Layout>,
}

impl GaussianIn {
    pub fn new(
        route: Route,
        title: &str,
        charge: i32,
        multiplicity: u32,
        molecule: GeometrySnapshot,
    ) -> Self {
        GaussianIn {
            link0: Link0::new(),
            route,
            title: title.to_string(),
            charge,
            multiplicity,
            molecule,
            freeze: Vec::new(),
            trailing: String::new(),
            layout: None,
        }
    }

    /// Starts a new job from a finished calculation: same route, charge and
    /// multiplicity, and its last geometry.
    ///
    /// # Errors
    ///
    /// Returns an error if the log lacks a route, a charge line or a geometry.
    pub fn from_output(out: &GaussianOut, title: &str) -> Result<Self, CError> {
        let route = Route::parse(out.route().unwrap_or_default())?;
        let (charge, multiplicity) = out.charge_multiplicity().ok_or(CError::MissingSection {
            format: "Gaussian output",
            section: "charge/multiplicity",
        })?;
        let molecule = out.last_snapshot()?.clone();
        Ok(GaussianIn::new(route, title, charge, multiplicity, molecule))
    }

    /// Replaces the molecule, e.g. by the final geometry of an optimization
    /// or a geometry read from an XYZ file. Freeze flags are dropped.
    pub fn set_geometry(&mut self, molecule: GeometrySnapshot) {
        self.molecule = molecule;
        self.freeze.clear();
    }

    fn freeze_flag(&self, index: usize) -> Option<FreezeFlag> {
        self.freeze.get(index).copied().flatten()
    }

    fn validate(&self) -> Result<GeometrySource, CError> {
        if !self.route.prefix.starts_with('#') {
            return Err(CError::InvalidValue(format!(
                "route prefix '{}' does not start with '#'",
                self.route.prefix
            )));
        }
        if self.multiplicity == 0 {
            return Err(CError::InvalidValue("multiplicity must be positive".into()));
        }
        if !self.freeze.is_empty() && self.freeze.len() != self.molecule.size() {
            return Err(CError::InvalidValue(format!(
                "{} freeze flags for {} atoms",
                self.freeze.len(),
                self.molecule.size()
            )));
        }
        let source = self.route.geometry_source();
        if source == GeometrySource::Inline && self.molecule.is_empty() {
            return Err(CError::EmptyGeometry);
        }
        Ok(source)
    }
}

fn push_line(out: &mut String, line: &str) {
    out.push_str(line);
    out.push('\n');
}

/// Copies the original lines of a section if its value did not change since
/// parsing, regenerates the section otherwise.
fn emit<T: PartialEq>(
    out: &mut String,
    value: &T,
    source: Option<(&T, &[String])>,
    generate: impl FnOnce(&mut String),
) {
    match source {
        Some((original, lines)) if original == value => {
            for line in lines {
                push_line(out, line);
            }
        }
        _ => generate(out),
    }
}

fn atom_line(atom: &Atom, flag: Option<FreezeFlag>) -> String {
    let [x, y, z] = [atom.position.x, atom.position.y, atom.position.z];
    match flag {
        Some(flag) => format!(
            " {:<2}{:>4}{:>16.8}{:>16.8}{:>16.8}",
            atom.symbol(),
            flag.code(),
            x,
            y,
            z
        ),
        None => format!(" {:<2}{:>16.8}{:>16.8}{:>16.8}", atom.symbol(), x, y, z),
    }
}

impl WriteFormat for GaussianIn {
    /// # Errors
    ///
    /// Returns an error if the multiplicity is zero, if the freeze flags do
    /// not match the atoms, or if an inline molecule is empty.
    fn render(&self) -> Result<String, CError> {
        let source = self.validate()?;
        let layout = self.layout.as_ref();
        let mut out = String::new();

        for line in layout.map(|l| l.leading.as_slice()).unwrap_or_default() {
            push_line(&mut out, line);
        }

        let original = layout.map(|l| (&l.link0.0, l.link0.1.as_slice()));
        emit(&mut out, &self.link0, original, |out| {
            for (key, value) in self.link0.iter() {
                if value.is_empty() {
                    push_line(out, &format!("%{key}"));
                } else {
                    push_line(out, &format!("%{key}={value}"));
                }
            }
        });

        let original = layout.map(|l| (&l.route.0, l.route.1.as_slice()));
        emit(&mut out, &self.route, original, |out| {
            push_line(out, &self.route.to_string())
        });
        push_line(&mut out, layout.map_or("", |l| l.route_end.as_str()));

        if source != GeometrySource::AllCheck {
            let body = layout.and_then(|l| l.body.as_ref());
            let original = body.map(|b| (&b.title.0, b.title.1.as_slice()));
            emit(&mut out, &self.title, original, |out| {
                for line in self.title.lines() {
                    push_line(out, line);
                }
            });
            push_line(&mut out, body.map_or("", |b| b.title_end.as_str()));

            let charge = (self.charge, self.multiplicity);
            let original = body.map(|b| (&b.charge.0, std::slice::from_ref(&b.charge.1)));
            emit(&mut out, &charge, original, |out| {
                push_line(out, &format!("{} {}", self.charge, self.multiplicity))
            });

            if source == GeometrySource::Inline {
                let atoms = body.map(|b| b.atoms.as_slice()).unwrap_or_default();
                for (i, atom) in self.molecule.iter().enumerate() {
                    let flag = self.freeze_flag(i);
                    match atoms.get(i) {
                        Some((a, f, line)) if a == atom && *f == flag => push_line(&mut out, line),
                        _ => push_line(&mut out, &atom_line(atom, flag)),
                    }
                }
            }
            match body {
                Some(BodyLayout {
                    molecule_end: None, ..
                }) => {}
                _ => push_line(
                    &mut out,
                    body.and_then(|b| b.molecule_end.as_deref()).unwrap_or(""),
                ),
            }
        }

        out.push_str(&self.trailing);
        Ok(out)
    }
}

/// Line-by-line cursor that keeps track of line numbers and of the
/// unread remainder of the text.
struct LineCursor<'a> {
    text: &'a str,
    offset: usize,
    lineno: usize,
}

impl<'a> LineCursor<'a> {
    fn new(text: &'a str) -> Self {
        LineCursor {
            text,
            offset: 0,
            lineno: 0,
        }
    }

    /// The next line without its `\n`, and its 1-based number.
    fn next_line(&mut self) -> Option<(usize, &'a str)> {
        if self.offset >= self.text.len() {
            return None;
        }
        let rest = &self.text[self.offset..];
        let (line, consumed) = match rest.find('\n') {
            Some(end) => (&rest[..end], end + 1),
            None => (rest, rest.len()),
        };
        self.offset += consumed;
        self.lineno += 1;
        Some((self.lineno, line))
    }

    fn peek(&self) -> Option<&'a str> {
        let rest = &self.text[self.offset..];
        if rest.is_empty() {
            return None;
        }
        Some(rest.split('\n').next().unwrap_or(rest))
    }

    fn rest(&self) -> &'a str {
        &self.text[self.offset..]
    }
}

fn is_blank(line: &str) -> bool {
    line.trim().is_empty()
}

/// Reads lines up to (and consuming) the next blank line. Returns the lines
/// and the blank line, or `None` for the blank line at the end of the text.
fn read_section<'a>(cursor: &mut LineCursor<'a>) -> (Vec<(usize, &'a str)>, Option<&'a str>) {
    let mut lines = Vec::new();
    while let Some((lineno, line)) = cursor.next_line() {
        if is_blank(line) {
            return (lines, Some(line));
        }
        lines.push((lineno, line));
    }
    (lines, None)
}

fn parse_charge_line(lineno: usize, line: &str) -> Result<(i32, u32), CError> {
    let tokens: Vec<&str> = line
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|t| !t.is_empty())
        .collect();
    let [charge, multiplicity] = tokens[..] else {
        return Err(CError::format(
            FORMAT,
            lineno,
            format!("expected charge and multiplicity, got '{}'", line.trim()),
        ));
    };
    let charge = charge.parse::<i32>().map_err(|e| {
        CError::format(FORMAT, lineno, format!("invalid charge '{charge}': {e}"))
    })?;
    let multiplicity = multiplicity.parse::<i32>().map_err(|e| {
        CError::format(FORMAT, lineno, format!("invalid multiplicity '{multiplicity}': {e}"))
    })?;
    if multiplicity <= 0 {
        return Err(CError::format(
            FORMAT,
            lineno,
            format!("multiplicity must be positive, got {multiplicity}"),
        ));
    }
    Ok((charge, multiplicity as u32))
}

/// Element of a molecule-specification label: `8`, `O`, `O1`, `C-CA`, `Cl2`.
fn parse_element(lineno: usize, label: &str) -> Result<u8, CError> {
    if let Ok(number) = label.parse::<u8>() {
        return Ok(number);
    }
    let letters: String = label
        .chars()
        .take_while(char::is_ascii_alphabetic)
        .collect();
    let candidates = [letters.as_str(), letters.get(..2).unwrap_or(""), letters.get(..1).unwrap_or("")];
    candidates
        .iter()
        .filter(|c| !c.is_empty())
        .find_map(|c| periodic::atomic_number(c))
        .ok_or_else(|| CError::format(FORMAT, lineno, format!("unknown element '{label}'")))
}

fn parse_atom_line(lineno: usize, line: &str) -> Result<(Atom, Option<FreezeFlag>), CError> {
    let tokens: Vec<&str> = line
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|t| !t.is_empty())
        .collect();
    let (label, flag, coordinates) = match tokens[..] {
        [label, x, y, z] => (label, None, [x, y, z]),
        [label, flag, x, y, z] => (label, Some(flag), [x, y, z]),
        _ => {
            return Err(CError::format(
                FORMAT,
                lineno,
                format!("expected 'element [flag] x y z', got '{}'", line.trim()),
            ))
        }
    };

    let flag = match flag {
        Some(token) => {
            let code = token.parse::<i32>().map_err(|e| {
                CError::format(FORMAT, lineno, format!("invalid freeze flag '{token}': {e}"))
            })?;
            Some(FreezeFlag::from_code(code).ok_or_else(|| {
                CError::format(FORMAT, lineno, format!("unsupported freeze flag {code}"))
            })?)
        }
        None => None,
    };

    let mut position = [0.0; 3];
    for (value, token) in position.iter_mut().zip(coordinates) {
        *value = token.parse::<f64>().map_err(|e| {
            CError::format(FORMAT, lineno, format!("invalid coordinate '{token}': {e}"))
        })?;
    }

    let atom = Atom::from_atomic_number(parse_element(lineno, label)?, position)?;
    Ok((atom, flag))
}

fn missing(section: &'static str) -> CError {
    CError::MissingSection {
        format: FORMAT,
        section,
    }
}

fn owned(lines: &[(usize, &str)]) -> Vec<String> {
    lines.iter().map(|(_, l)| l.to_string()).collect()
}

impl FileFormat for GaussianIn {
    /// Parses a single job. Use [`read_deck`](crate::formats::deck::read_deck)
    /// for files containing `--Link1--` separators.
    ///
    /// # Errors
    ///
    /// Returns an error if the route, the charge and multiplicity or the
    /// molecule is missing, or if a numeric field is malformed.
    fn parse(text: &str) -> Result<Self, CError> {
        let mut cursor = LineCursor::new(text);

        let mut leading = Vec::new();
        while cursor.peek().is_some_and(is_blank) {
            if let Some((_, line)) = cursor.next_line() {
                leading.push(line.to_string());
            }
        }

        let mut link0 = Link0::new();
        let mut link0_lines = Vec::new();
        while cursor.peek().is_some_and(|l| l.trim_start().starts_with('%')) {
            let Some((lineno, line)) = cursor.next_line() else {
                break;
            };
            let (key, value) = Link0::parse_line(lineno, line)?;
            link0.entries.push((key, value));
            link0_lines.push(line.to_string());
        }

        let (route_lines, route_end) = read_section(&mut cursor);
        if !route_lines
            .first()
            .is_some_and(|(_, l)| l.trim_start().starts_with('#'))
        {
            return Err(missing("route"));
        }
        let joined: Vec<&str> = route_lines.iter().map(|(_, l)| l.trim()).collect();
        let route = Route::parse(&joined.join(" "))?;
        let source = route.geometry_source();

        let mut job = GaussianIn::new(route.clone(), "", 0, 1, GeometrySnapshot::new());
        job.link0 = link0.clone();
        let mut layout = Layout {
            leading,
            link0: (link0, link0_lines),
            route: (route, owned(&route_lines)),
            route_end: route_end.unwrap_or_default().to_string(),
            body: None,
        };

        if source == GeometrySource::AllCheck {
            job.trailing = cursor.rest().to_string();
            job.layout = Some(layout);
            return Ok(job);
        }
        if route_end.is_none() {
            return Err(missing("title"));
        }

        let (title_lines, title_end) = read_section(&mut cursor);
        let title: Vec<&str> = title_lines.iter().map(|(_, l)| l.trim()).collect();
        job.title = title.join("\n");

        let (lineno, charge_line) = cursor
            .next_line()
            .filter(|(_, l)| !is_blank(l))
            .ok_or_else(|| missing("charge/multiplicity"))?;
        let (charge, multiplicity) = parse_charge_line(lineno, charge_line)?;
        job.charge = charge;
        job.multiplicity = multiplicity;
        let mut atoms = Vec::new();

        let (atom_lines, molecule_end) = read_section(&mut cursor);
        if source == GeometrySource::Inline {
            if atom_lines.is_empty() {
                return Err(missing("molecule"));
            }
            for &(lineno, line) in &atom_lines {
                let (atom, flag) = parse_atom_line(lineno, line)?;
                job.molecule.add_atom(atom.clone());
                job.freeze.push(flag);
                atoms.push((atom, flag, line.to_string()));
            }
            if job.freeze.iter().all(Option::is_none) {
                job.freeze.clear();
            }
        } else if let Some(&(lineno, line)) = atom_lines.first() {
            return Err(CError::format(
                FORMAT,
                lineno,
                format!(
                    "the route reads the geometry from the checkpoint, but '{}' follows the charge line",
                    line.trim()
                ),
            ));
        }
        layout.body = Some(BodyLayout {
            title: (job.title.clone(), owned(&title_lines)),
            title_end: title_end.unwrap_or_default().to_string(),
            charge: ((charge, multiplicity), charge_line.to_string()),
            atoms,
            molecule_end: molecule_end.map(str::to_string),
        });

        job.trailing = cursor.rest().to_string();
        job.layout = Some(layout);
        Ok(job)
    }
}
