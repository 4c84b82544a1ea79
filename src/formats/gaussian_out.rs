// SPDX-License-Identifier: BSD-3-Clause
// Copyright (c) 2025 William Bro-Jørgensen
// Copyright (c) 2020 Guillaume Fraux and contributors
//
// See LICENSE at the project root for full text.

//! Reader for Gaussian calculation logs.
//!
//! The log has no declared schema: results are found by recognizing marker
//! lines (orientation tables, `SCF Done`, termination lines, ...) in a single
//! forward scan. The scan is an explicit state machine, [`ScanState`], fed one
//! line at a time; [`Marker::recognize`] is the only place that knows the
//! wording of the markers.

use crate::atom::Atom;
use crate::error::CError;
use crate::format::FileFormat;
use crate::geometry::GeometrySnapshot;
use log::{debug, warn};
use std::collections::BTreeMap;
use std::time::Duration;

const FORMAT: &str = "Gaussian output";

/// How the job ended, as far as the log tells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationStatus {
    /// `Normal termination of Gaussian` was found.
    Normal,
    /// `Error termination` was found.
    Error,
    /// No termination line: the job is still running or the log is truncated.
    Incomplete,
}

/// Classification of an error termination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    ScfConvergenceFailure,
    OptimizationNonConvergence,
    AtomsTooClose,
    MemoryAllocation,
    InputSyntax,
    /// Termination requested by link 9999 without a more specific diagnostic.
    Link9999Abort,
    Unrecognized,
}

/// Why a job ended with an error termination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobError {
    pub kind: ErrorKind,
    /// The link that failed, e.g. `l502`.
    pub link: Option<String>,
    /// The diagnostic line closest before the termination, trimmed.
    pub message: String,
}

/// Which orientation table a geometry was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    Standard,
    Input,
}

/// One `SCF Done` line.
#[derive(Debug, Clone, PartialEq)]
pub struct ScfEnergy {
    /// Total energy in Hartree.
    pub value: f64,
    /// The label printed before the energy, e.g. `E(RB3LYP)`.
    pub method: String,
    /// Index of the last standard-orientation snapshot completed before
    /// this energy was printed, if any.
    pub snapshot: Option<usize>,
}

/// One row of a `Converged?` table, e.g. `Maximum Force`.
#[derive(Debug, Clone, PartialEq)]
pub struct ConvergenceCriterion {
    /// Item name with single spaces: `RMS Force`, `Maximum Displacement`.
    pub name: String,
    pub value: f64,
    pub threshold: f64,
    pub converged: bool,
}

/// The convergence table printed after an optimization step.
#[derive(Debug, Clone, PartialEq)]
pub struct ConvergenceStep {
    pub criteria: Vec<ConvergenceCriterion>,
    /// Index of the last standard-orientation snapshot completed before
    /// the table was printed, if any.
    pub snapshot: Option<usize>,
}

impl ConvergenceStep {
    /// `true` when every criterion of the table is met.
    pub fn is_converged(&self) -> bool {
        !self.criteria.is_empty() && self.criteria.iter().all(|c| c.converged)
    }

    /// The criterion called `name`, ignoring case.
    pub fn criterion(&self, name: &str) -> Option<&ConvergenceCriterion> {
        self.criteria
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }
}

/// Everything read from one Gaussian log.
///
/// The energies and the snapshots are two independent sequences: an
/// optimization usually prints one energy per geometry, but nothing in the
/// format guarantees it. [`ScfEnergy::snapshot`] records which geometry
/// preceded each energy.
#[derive(Debug, Clone)]
pub struct GaussianOut {
    snapshots: Vec<GeometrySnapshot>,
    input_orientations: Vec<GeometrySnapshot>,
    energies: Vec<ScfEnergy>,
    convergence: Vec<ConvergenceStep>,
    status: TerminationStatus,
    error: Option<JobError>,
    route: Option<String>,
    charge_multiplicity: Option<(i32, u32)>,
    optimization_completed: bool,
    cpu_time: Duration,
    elapsed_time: Duration,
    finished_at: Option<String>,
    summary: BTreeMap<String, String>,
}

impl GaussianOut {
    /// Splits a log containing several job steps (`--Link1--` decks) and
    /// parses every step. A log with a single step yields one element.
    ///
    /// # Errors
    ///
    /// Returns the first error from any of the steps.
    pub fn parse_links(text: &str) -> Result<Vec<GaussianOut>, CError> {
        let mut starts = Vec::new();
        let mut offset = 0;
        for line in text.split_inclusive('\n') {
            if line.starts_with(" Initial command:") {
                starts.push(offset);
            }
            offset += line.len();
        }

        if starts.len() < 2 {
            return Ok(vec![GaussianOut::parse(text)?]);
        }

        // anything before the first step belongs to it
        starts[0] = 0;
        starts.push(text.len());
        starts
            .windows(2)
            .map(|bounds| GaussianOut::parse(&text[bounds[0]..bounds[1]]))
            .collect()
    }

    /// Standard-orientation geometries in the order they were printed.
    pub fn snapshots(&self) -> &[GeometrySnapshot] {
        &self.snapshots
    }

    /// Returns the snapshot at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`CError::NotFound`] if there is no such snapshot.
    pub fn snapshot(&self, index: usize) -> Result<&GeometrySnapshot, CError> {
        self.snapshots.get(index).ok_or(CError::NotFound {
            what: "snapshot",
            index,
            len: self.snapshots.len(),
        })
    }

    /// The final geometry of the job.
    pub fn last_snapshot(&self) -> Result<&GeometrySnapshot, CError> {
        self.snapshots.last().ok_or(CError::NotFound {
            what: "snapshot",
            index: 0,
            len: 0,
        })
    }

    /// Input-orientation geometries, printed instead of (or next to) the
    /// standard orientation, e.g. with `nosymm`.
    pub fn input_orientations(&self) -> &[GeometrySnapshot] {
        &self.input_orientations
    }

    pub fn energies(&self) -> &[ScfEnergy] {
        &self.energies
    }

    /// Returns the SCF energy at `index`, in Hartree.
    ///
    /// # Errors
    ///
    /// Returns [`CError::NotFound`] if there is no such energy.
    pub fn energy(&self, index: usize) -> Result<f64, CError> {
        self.energies
            .get(index)
            .map(|e| e.value)
            .ok_or(CError::NotFound {
                what: "energy",
                index,
                len: self.energies.len(),
            })
    }

    /// The last SCF energy printed.
    pub fn final_energy(&self) -> Result<f64, CError> {
        self.energies.last().map(|e| e.value).ok_or(CError::NotFound {
            what: "energy",
            index: 0,
            len: 0,
        })
    }

    /// Convergence tables of an optimization, one per step.
    pub fn convergence_steps(&self) -> &[ConvergenceStep] {
        &self.convergence
    }

    /// Returns the convergence table at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`CError::NotFound`] if there is no such table.
    pub fn convergence(&self, index: usize) -> Result<&ConvergenceStep, CError> {
        self.convergence.get(index).ok_or(CError::NotFound {
            what: "convergence step",
            index,
            len: self.convergence.len(),
        })
    }

    pub fn status(&self) -> TerminationStatus {
        self.status
    }

    pub fn is_normal(&self) -> bool {
        self.status == TerminationStatus::Normal
    }

    /// Set only when [`status`](Self::status) is
    /// [`TerminationStatus::Error`].
    pub fn error(&self) -> Option<&JobError> {
        self.error.as_ref()
    }

    /// The route section echoed at the top of the log.
    pub fn route(&self) -> Option<&str> {
        self.route.as_deref()
    }

    pub fn charge_multiplicity(&self) -> Option<(i32, u32)> {
        self.charge_multiplicity
    }

    pub fn optimization_completed(&self) -> bool {
        self.optimization_completed
    }

    /// Sum of all `Job cpu time` lines.
    pub fn cpu_time(&self) -> Duration {
        self.cpu_time
    }

    /// Sum of all `Elapsed time` lines.
    pub fn elapsed_time(&self) -> Duration {
        self.elapsed_time
    }

    /// The date printed on the termination line, e.g.
    /// `Sat Jan  6 10:00:00 2024`.
    pub fn finished_at(&self) -> Option<&str> {
        self.finished_at.as_deref()
    }

    /// `key=value` entries of the archive block (`Version`, `HF`, ...).
    pub fn summary(&self) -> &BTreeMap<String, String> {
        &self.summary
    }

    pub fn summary_value(&self, key: &str) -> Option<&str> {
        self.summary.get(key).map(String::as_str)
    }
}

impl FileFormat for GaussianOut {
    /// Parses one job step. Scanning stops at the first termination line.
    ///
    /// # Errors
    ///
    /// Returns an error if the text contains no Gaussian marker at all, or
    /// if a recognized section is malformed. A failed calculation is not an
    /// error: check [`GaussianOut::status`].
    fn parse(text: &str) -> Result<Self, CError> {
        let mut scanner = Scanner::new();
        for (i, line) in text.lines().enumerate() {
            scanner.feed(i + 1, line)?;
            if scanner.state == ScanState::Done {
                break;
            }
        }
        scanner.finish()
    }
}

/// Marker lines recognized while searching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Marker {
    Banner,
    Route,
    ChargeMultiplicity,
    Orientation(Orientation),
    ScfDone,
    ConvergenceTable,
    OptimizationCompleted,
    Diagnostic(ErrorKind),
    ArchiveStart,
    CpuTime,
    ElapsedTime,
    NormalTermination,
    ErrorTermination,
}

/// Lines announcing why a job is about to fail.
const DIAGNOSTICS: [(&str, ErrorKind); 8] = [
    ("Convergence failure -- run terminated.", ErrorKind::ScfConvergenceFailure),
    ("Optimization stopped.", ErrorKind::OptimizationNonConvergence),
    ("Number of steps exceeded", ErrorKind::OptimizationNonConvergence),
    ("Small interatomic distances encountered", ErrorKind::AtomsTooClose),
    ("Atoms too close.", ErrorKind::AtomsTooClose),
    ("galloc:  could not allocate memory", ErrorKind::MemoryAllocation),
    ("Out-of-memory error", ErrorKind::MemoryAllocation),
    ("QPErr", ErrorKind::InputSyntax),
];

impl Marker {
    fn recognize(line: &str) -> Option<Marker> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return None;
        }

        if line.starts_with(" Normal termination of Gaussian") {
            return Some(Marker::NormalTermination);
        }
        if line.starts_with(" Error termination") {
            return Some(Marker::ErrorTermination);
        }
        if line.starts_with(" SCF Done:") {
            return Some(Marker::ScfDone);
        }
        match trimmed {
            "Standard orientation:" => return Some(Marker::Orientation(Orientation::Standard)),
            "Input orientation:" => return Some(Marker::Orientation(Orientation::Input)),
            "Optimization completed." => return Some(Marker::OptimizationCompleted),
            _ => {}
        }
        if trimmed.starts_with("Item") && trimmed.ends_with("Converged?") {
            return Some(Marker::ConvergenceTable);
        }
        if line.starts_with(" #") {
            return Some(Marker::Route);
        }
        if trimmed.starts_with("Charge =") && trimmed.contains("Multiplicity =") {
            return Some(Marker::ChargeMultiplicity);
        }
        if trimmed.starts_with("1\\1\\") {
            return Some(Marker::ArchiveStart);
        }
        if trimmed.starts_with("Job cpu time:") {
            return Some(Marker::CpuTime);
        }
        if trimmed.starts_with("Elapsed time:") {
            return Some(Marker::ElapsedTime);
        }
        if trimmed.contains("Entering Gaussian System") || trimmed.starts_with("Initial command:")
        {
            return Some(Marker::Banner);
        }
        DIAGNOSTICS
            .iter()
            .find(|(pattern, _)| trimmed.contains(pattern))
            .map(|&(_, kind)| Marker::Diagnostic(kind))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    Searching,
    /// Inside the route echo, until the next dashed rule.
    InRoute,
    /// Inside an orientation table. `rules` counts the dashed rules seen so
    /// far: data rows follow the second one, the third one closes the table.
    InGeometryBlock {
        orientation: Orientation,
        rules: u8,
    },
    /// Inside a `Converged?` table, until the first line that is not a
    /// `name value threshold YES|NO` row.
    InConvergence,
    /// Inside the archive block, until the line ending with `@`.
    InArchive,
    Done,
}

struct Scanner {
    state: ScanState,
    current: GeometrySnapshot,
    criteria: Vec<ConvergenceCriterion>,
    /// Dashed rules seen while searching; the route follows the first one.
    rules: usize,
    route: String,
    archive: String,
    /// Most recent diagnostic marker, with its line.
    diagnostic: Option<(ErrorKind, String)>,
    /// Most recent non-blank line.
    previous: String,
    found_marker: bool,
    out: GaussianOut,
}

fn is_rule(line: &str) -> bool {
    let trimmed = line.trim();
    !trimmed.is_empty() && trimmed.chars().all(|c| c == '-')
}

/// Value printed after `key` on `line`, e.g. `value_after(l, "Charge =")`.
fn value_after<'a>(line: &'a str, key: &str) -> Option<&'a str> {
    let start = line.find(key)? + key.len();
    line[start..].split_whitespace().next()
}

/// Converts `0 days  0 hours  1 minutes 23.4 seconds.` to a duration.
fn parse_duration(lineno: usize, line: &str) -> Result<Duration, CError> {
    let numbers: Vec<f64> = line
        .split_whitespace()
        .filter_map(|token| token.parse::<f64>().ok())
        .collect();
    match numbers[..] {
        [days, hours, minutes, seconds] => {
            let total = ((days * 24.0 + hours) * 60.0 + minutes) * 60.0 + seconds;
            Duration::try_from_secs_f64(total).map_err(|e| {
                CError::format(
                    FORMAT,
                    lineno,
                    format!("invalid duration in '{}': {e}", line.trim()),
                )
            })
        }
        _ => Err(CError::format(
            FORMAT,
            lineno,
            format!("expected days, hours, minutes and seconds in '{}'", line.trim()),
        )),
    }
}

/// Name of the failing link: `l502` from `.../l502.exe`, or `l9999` from
/// `request processed by link 9999.`
fn failing_link(line: &str) -> Option<String> {
    if let Some(number) = value_after(line, "processed by link") {
        return Some(format!("l{}", number.trim_end_matches('.')));
    }
    let end = line.find(".exe")?;
    let start = line[..end].rfind(['/', '\\', ' '])? + 1;
    Some(line[start..end].to_string())
}

impl Scanner {
    fn new() -> Self {
        Scanner {
            state: ScanState::Searching,
            current: GeometrySnapshot::new(),
            criteria: Vec::new(),
            rules: 0,
            route: String::new(),
            archive: String::new(),
            diagnostic: None,
            previous: String::new(),
            found_marker: false,
            out: GaussianOut {
                snapshots: Vec::new(),
                input_orientations: Vec::new(),
                energies: Vec::new(),
                convergence: Vec::new(),
                status: TerminationStatus::Incomplete,
                error: None,
                route: None,
                charge_multiplicity: None,
                optimization_completed: false,
                cpu_time: Duration::ZERO,
                elapsed_time: Duration::ZERO,
                finished_at: None,
                summary: BTreeMap::new(),
            },
        }
    }

    fn feed(&mut self, lineno: usize, line: &str) -> Result<(), CError> {
        match self.state {
            ScanState::Searching => self.search(lineno, line)?,
            ScanState::InRoute => self.read_route(line),
            ScanState::InGeometryBlock { orientation, rules } => {
                self.read_geometry(lineno, line, orientation, rules)?
            }
            ScanState::InConvergence => self.read_convergence(lineno, line)?,
            ScanState::InArchive => self.read_archive(line),
            ScanState::Done => {}
        }
        if !line.trim().is_empty() {
            self.previous.clear();
            self.previous.push_str(line.trim());
        }
        Ok(())
    }

    fn enter(&mut self, state: ScanState) {
        debug!("{:?} -> {:?}", self.state, state);
        self.state = state;
    }

    fn search(&mut self, lineno: usize, line: &str) -> Result<(), CError> {
        if is_rule(line) {
            self.rules += 1;
            return Ok(());
        }
        let Some(marker) = Marker::recognize(line) else {
            return Ok(());
        };
        self.found_marker = true;

        match marker {
            Marker::Banner => {}
            Marker::Route => {
                // the route is echoed once per job step, framed by the first two rules
                if self.rules == 1 && is_rule(&self.previous) && self.out.route.is_none() {
                    self.read_route(line);
                    self.enter(ScanState::InRoute);
                }
            }
            Marker::ChargeMultiplicity => {
                if self.out.charge_multiplicity.is_none() {
                    self.out.charge_multiplicity = Some(Self::parse_charge(lineno, line)?);
                }
            }
            Marker::Orientation(orientation) => {
                self.current = GeometrySnapshot::new();
                self.enter(ScanState::InGeometryBlock {
                    orientation,
                    rules: 0,
                });
            }
            Marker::ScfDone => {
                let energy = Self::parse_scf(lineno, line, self.out.snapshots.len())?;
                self.out.energies.push(energy);
            }
            Marker::ConvergenceTable => {
                self.criteria.clear();
                self.enter(ScanState::InConvergence);
            }
            Marker::OptimizationCompleted => self.out.optimization_completed = true,
            Marker::Diagnostic(kind) => self.diagnostic = Some((kind, line.trim().to_string())),
            Marker::ArchiveStart => {
                self.archive.clear();
                self.enter(ScanState::InArchive);
                self.read_archive(line);
            }
            Marker::CpuTime => self.out.cpu_time += parse_duration(lineno, line)?,
            Marker::ElapsedTime => self.out.elapsed_time += parse_duration(lineno, line)?,
            Marker::NormalTermination => {
                self.out.status = TerminationStatus::Normal;
                self.out.finished_at = Self::termination_date(line);
                self.enter(ScanState::Done);
            }
            Marker::ErrorTermination => {
                self.out.status = TerminationStatus::Error;
                self.out.finished_at = Self::termination_date(line);
                self.out.error = Some(self.classify_error(line));
                self.enter(ScanState::Done);
            }
        }
        Ok(())
    }

    fn read_route(&mut self, line: &str) {
        if is_rule(line) {
            self.out.route = Some(self.route.trim().to_string());
            self.enter(ScanState::Searching);
            return;
        }
        // long routes wrap at a fixed column; only the carriage-control space is dropped
        self.route.push_str(line.strip_prefix(' ').unwrap_or(line));
    }

    fn read_geometry(
        &mut self,
        lineno: usize,
        line: &str,
        orientation: Orientation,
        rules: u8,
    ) -> Result<(), CError> {
        if is_rule(line) {
            if rules < 2 {
                self.state = ScanState::InGeometryBlock {
                    orientation,
                    rules: rules + 1,
                };
            } else {
                self.close_geometry(lineno, orientation)?;
            }
            return Ok(());
        }
        if rules < 2 {
            // column titles
            return Ok(());
        }

        let tokens: Vec<&str> = line.split_whitespace().collect();
        // `center number [type] x y z`, the type column is missing in old versions
        if tokens.len() != 5 && tokens.len() != 6 {
            return Err(CError::format(
                FORMAT,
                lineno,
                format!("expected 5 or 6 columns in orientation row, got '{}'", line.trim()),
            ));
        }
        let number = tokens[1].parse::<i32>().map_err(|e| {
            CError::format(FORMAT, lineno, format!("invalid atomic number '{}': {e}", tokens[1]))
        })?;
        let mut position = [0.0; 3];
        for (value, token) in position.iter_mut().zip(&tokens[tokens.len() - 3..]) {
            *value = token.parse::<f64>().map_err(|e| {
                CError::format(FORMAT, lineno, format!("invalid coordinate '{token}': {e}"))
            })?;
        }

        if number < 0 {
            debug!("skipping dummy atom on line {lineno}");
            return Ok(());
        }
        let number = u8::try_from(number)
            .map_err(|_| CError::UnknownElement(number.to_string()))?;
        self.current.add_atom(Atom::from_atomic_number(number, position)?);
        Ok(())
    }

    fn close_geometry(&mut self, lineno: usize, orientation: Orientation) -> Result<(), CError> {
        let snapshot = std::mem::take(&mut self.current);
        let target = match orientation {
            Orientation::Standard => &mut self.out.snapshots,
            Orientation::Input => &mut self.out.input_orientations,
        };
        if let Some(first) = target.first() {
            if first.size() != snapshot.size() {
                return Err(CError::format(
                    FORMAT,
                    lineno,
                    format!(
                        "geometry has {} atoms, previous geometries have {}",
                        snapshot.size(),
                        first.size()
                    ),
                ));
            }
        }
        target.push(snapshot);
        self.enter(ScanState::Searching);
        Ok(())
    }

    fn read_convergence(&mut self, lineno: usize, line: &str) -> Result<(), CError> {
        match Self::parse_criterion(lineno, line)? {
            Some(criterion) => {
                self.criteria.push(criterion);
                Ok(())
            }
            None => {
                self.close_convergence();
                self.search(lineno, line)
            }
        }
    }

    fn close_convergence(&mut self) {
        self.out.convergence.push(ConvergenceStep {
            criteria: std::mem::take(&mut self.criteria),
            snapshot: self.out.snapshots.len().checked_sub(1),
        });
        self.enter(ScanState::Searching);
    }

    /// `Maximum Force  0.000011  0.000450  YES`, or `None` for any line that
    /// does not end with `YES`/`NO`.
    fn parse_criterion(lineno: usize, line: &str) -> Result<Option<ConvergenceCriterion>, CError> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let [name @ .., value, threshold, flag] = &tokens[..] else {
            return Ok(None);
        };
        let converged = match *flag {
            "YES" => true,
            "NO" => false,
            _ => return Ok(None),
        };
        if name.is_empty() {
            return Ok(None);
        }
        let number = |token: &str| {
            token.parse::<f64>().map_err(|e| {
                CError::format(
                    FORMAT,
                    lineno,
                    format!("invalid convergence value '{token}': {e}"),
                )
            })
        };
        Ok(Some(ConvergenceCriterion {
            name: name.join(" "),
            value: number(*value)?,
            threshold: number(*threshold)?,
            converged,
        }))
    }

    fn read_archive(&mut self, line: &str) {
        let trimmed = line.trim();
        self.archive.push_str(trimmed);
        if trimmed.ends_with('@') {
            self.parse_archive();
            self.enter(ScanState::Searching);
        }
    }

    /// The archive is a `\\`-separated list of sections; the fifth one holds
    /// the results as `\`-separated `key=value` pairs.
    fn parse_archive(&mut self) {
        let sections: Vec<&str> = self.archive.split("\\\\").collect();
        let Some(results) = sections.get(4) else {
            warn!(
                "archive block has {} sections, expected at least 5; ignoring it",
                sections.len()
            );
            return;
        };
        for item in results.split('\\') {
            if let Some((key, value)) = item.split_once('=') {
                self.out.summary.insert(key.to_string(), value.to_string());
            }
        }
    }

    fn parse_charge(lineno: usize, line: &str) -> Result<(i32, u32), CError> {
        let charge = value_after(line, "Charge =").and_then(|v| v.parse::<i32>().ok());
        let multiplicity = value_after(line, "Multiplicity =").and_then(|v| v.parse::<u32>().ok());
        match (charge, multiplicity) {
            (Some(charge), Some(multiplicity)) => Ok((charge, multiplicity)),
            _ => Err(CError::format(
                FORMAT,
                lineno,
                format!("invalid charge and multiplicity '{}'", line.trim()),
            )),
        }
    }

    fn parse_scf(lineno: usize, line: &str, completed: usize) -> Result<ScfEnergy, CError> {
        let rest = &line[" SCF Done:".len()..];
        let (method, value) = rest.split_once('=').ok_or_else(|| {
            CError::format(FORMAT, lineno, format!("missing '=' in '{}'", line.trim()))
        })?;
        let token = value.split_whitespace().next().ok_or_else(|| {
            CError::format(FORMAT, lineno, "missing SCF energy value")
        })?;
        let value = token.parse::<f64>().map_err(|e| {
            CError::format(FORMAT, lineno, format!("invalid SCF energy '{token}': {e}"))
        })?;
        Ok(ScfEnergy {
            value,
            method: method.trim().to_string(),
            snapshot: completed.checked_sub(1),
        })
    }

    fn termination_date(line: &str) -> Option<String> {
        let (_, date) = line.split_once(" at ")?;
        Some(date.trim().trim_end_matches('.').to_string())
    }

    fn classify_error(&mut self, line: &str) -> JobError {
        let link = failing_link(line);
        match self.diagnostic.take() {
            Some((kind, message)) => JobError {
                kind,
                link,
                message,
            },
            None => {
                let kind = if link.as_deref() == Some("l9999") {
                    ErrorKind::Link9999Abort
                } else {
                    warn!("unrecognized error termination: {}", line.trim());
                    ErrorKind::Unrecognized
                };
                let message = if self.previous.is_empty() {
                    line.trim().to_string()
                } else {
                    self.previous.clone()
                };
                JobError {
                    kind,
                    link,
                    message,
                }
            }
        }
    }

    fn finish(mut self) -> Result<GaussianOut, CError> {
        if !self.found_marker {
            return Err(CError::format(
                FORMAT,
                0,
                "no Gaussian section markers found; this is not a Gaussian log",
            ));
        }
        if self.state == ScanState::InConvergence {
            self.close_convergence();
        }
        if let ScanState::InGeometryBlock { orientation, .. } = self.state {
            warn!(
                "log ends inside a {orientation:?} orientation table; discarding {} atoms",
                self.current.size()
            );
        }

        let out = self.out;
        if !out.energies.is_empty() && out.energies.len() != out.snapshots.len() {
            debug!(
                "{} SCF energies for {} geometries",
                out.energies.len(),
                out.snapshots.len()
            );
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::FileFormat;
    use assert_approx_eq::assert_approx_eq;
    use std::path::Path;

    fn open(name: &str) -> GaussianOut {
        let path = format!("./src/tests-data/gaussian/{name}");
        GaussianOut::open(Path::new(&path)).unwrap()
    }

    #[test]
    fn optimization() {
        let out = open("water_opt.log");
        assert_eq!(out.status(), TerminationStatus::Normal);
        assert!(out.is_normal());
        assert!(out.error().is_none());
        assert!(out.optimization_completed());

        assert_eq!(out.snapshots().len(), 3);
        assert_eq!(out.input_orientations().len(), 1);
        let last = out.last_snapshot().unwrap();
        assert_eq!(last.symbols(), vec!["O", "H", "H"]);
        assert_eq!(last[0].atomic_number(), 8);
        assert_approx_eq!(last[0].position.z, 0.120823, 1e-12);
        assert_approx_eq!(last[2].position.y, -0.758402, 1e-12);
        assert_approx_eq!(out.snapshot(0).unwrap()[1].position.y, 0.763239, 1e-12);

        assert_eq!(out.energies().len(), 3);
        assert_approx_eq!(out.energy(0).unwrap(), -76.4089533221, 1e-12);
        assert_approx_eq!(out.final_energy().unwrap(), -76.4089695821, 1e-12);
        assert_eq!(out.energies()[0].method, "E(RB3LYP)");
        let anchors: Vec<Option<usize>> = out.energies().iter().map(|e| e.snapshot).collect();
        assert_eq!(anchors, vec![Some(0), Some(1), Some(2)]);
    }

    #[test]
    fn header_timing_and_archive() {
        let out = open("water_opt.log");
        assert_eq!(out.route(), Some("#p opt b3lyp/6-31g(d)"));
        assert_eq!(out.charge_multiplicity(), Some((0, 1)));
        assert_approx_eq!(out.cpu_time().as_secs_f64(), 83.4, 1e-9);
        assert_approx_eq!(out.elapsed_time().as_secs_f64(), 12.5, 1e-9);
        assert_eq!(out.finished_at(), Some("Sat Jan  6 10:00:00 2024"));

        assert_eq!(out.summary_value("Version"), Some("ES64L-G16RevA.03"));
        assert_eq!(out.summary_value("HF"), Some("-76.4089696"));
        assert_eq!(out.summary_value("State"), Some("1-A1"));
        assert_eq!(out.summary_value("PG"), Some("C02V [C2(O1),SGV(H2)]"));
        assert!(out.summary_value("MP2").is_none());
    }

    #[test]
    fn scf_convergence_failure() {
        let out = open("scf_failure.log");
        assert_eq!(out.status(), TerminationStatus::Error);
        let error = out.error().unwrap();
        assert_eq!(error.kind, ErrorKind::ScfConvergenceFailure);
        assert_eq!(error.link.as_deref(), Some("l502"));
        assert_eq!(error.message, ">>>>>>>>>> Convergence failure -- run terminated.");
        assert_eq!(out.charge_multiplicity(), Some((-1, 2)));
        assert_eq!(out.snapshots().len(), 1);
        assert!(out.energies().is_empty());
        // the scan stops at the termination line
        assert_eq!(out.cpu_time(), Duration::ZERO);
    }

    #[test]
    fn optimization_failure() {
        let out = open("opt_failure.log");
        assert_eq!(out.status(), TerminationStatus::Error);
        let error = out.error().unwrap();
        assert_eq!(error.kind, ErrorKind::OptimizationNonConvergence);
        assert_eq!(error.link.as_deref(), Some("l9999"));
        assert!(!error.message.is_empty());
        assert!(!out.optimization_completed());
        assert_eq!(out.snapshots().len(), 2);
        assert_eq!(out.energies().len(), 2);
    }

    #[test]
    fn link_9999_without_diagnostic() {
        let text = " Entering Gaussian System, Link 0=g16\n\
                    \x20Some unexpected problem.\n\
                    \x20Error termination request processed by link 9999.\n";
        let out = GaussianOut::parse(text).unwrap();
        let error = out.error().unwrap();
        assert_eq!(error.kind, ErrorKind::Link9999Abort);
        assert_eq!(error.link.as_deref(), Some("l9999"));
        assert_eq!(error.message, "Some unexpected problem.");
    }

    #[test]
    fn unrecognized_error() {
        let text = " Entering Gaussian System, Link 0=g16\n\
                    \x20FileIO operation on non-existent file.\n\
                    \x20Error termination via Lnk1e in /opt/g16/l301.exe at Mon Jan  8 08:00:00 2024.\n";
        let out = GaussianOut::parse(text).unwrap();
        assert_eq!(out.finished_at(), Some("Mon Jan  8 08:00:00 2024"));
        let error = out.error().unwrap();
        assert_eq!(error.kind, ErrorKind::Unrecognized);
        assert_eq!(error.link.as_deref(), Some("l301"));
        assert_eq!(error.message, "FileIO operation on non-existent file.");
    }

    #[test]
    fn truncated_log() {
        let out = open("truncated.log");
        assert_eq!(out.status(), TerminationStatus::Incomplete);
        assert!(out.error().is_none());
        // the unfinished second table is dropped
        assert_eq!(out.snapshots().len(), 1);
        assert_eq!(out.energies().len(), 1);
        assert!(out.finished_at().is_none());
    }

    #[test]
    fn termination_without_geometry() {
        let text = " Entering Gaussian System, Link 0=g16\n\
                    \x20Normal termination of Gaussian 16 at Mon Jan  8 08:00:00 2024.\n";
        let out = GaussianOut::parse(text).unwrap();
        assert!(out.is_normal());
        assert!(out.snapshots().is_empty());
        assert!(out.energies().is_empty());
    }

    #[test]
    fn energy_before_geometry() {
        let text = " SCF Done:  E(RHF) =  -1.11750003910     A.U. after    4 cycles\n";
        let out = GaussianOut::parse(text).unwrap();
        assert_eq!(out.status(), TerminationStatus::Incomplete);
        assert!(out.snapshots().is_empty());
        assert_eq!(out.energies()[0].snapshot, None);
        assert_approx_eq!(out.energy(0).unwrap(), -1.1175000391, 1e-12);
    }

    #[test]
    fn missing_indices() {
        let out = open("water_opt.log");
        let err = out.snapshot(3).unwrap_err();
        assert!(matches!(err, CError::NotFound { index: 3, len: 3, .. }));
        assert!(!err.is_format_error());
        assert!(out.energy(7).is_err());

        let out = GaussianOut::parse(" Entering Gaussian System, Link 0=g16\n").unwrap();
        assert!(out.last_snapshot().is_err());
        assert!(out.final_energy().is_err());
    }

    #[test]
    fn multiple_links() {
        let text = std::fs::read_to_string("./src/tests-data/gaussian/two_links.log").unwrap();
        let steps = GaussianOut::parse_links(&text).unwrap();
        assert_eq!(steps.len(), 2);
        assert!(steps.iter().all(GaussianOut::is_normal));
        assert_eq!(steps[0].route(), Some("#p opt hf/sto-3g"));
        assert_eq!(steps[1].route(), Some("#p freq hf/sto-3g geom=check guess=read"));
        assert_eq!(steps[1].finished_at(), Some("Mon Jan  8 09:00:05 2024"));
        assert_approx_eq!(steps[1].cpu_time().as_secs_f64(), 2.0, 1e-9);

        // a plain parse stops after the first step
        let first = GaussianOut::parse(&text).unwrap();
        assert_eq!(first.route(), steps[0].route());

        let single = std::fs::read_to_string("./src/tests-data/gaussian/water_opt.log").unwrap();
        assert_eq!(GaussianOut::parse_links(&single).unwrap().len(), 1);
    }

    #[test]
    fn recognize_markers() {
        assert_eq!(
            Marker::recognize("                         Standard orientation:   "),
            Some(Marker::Orientation(Orientation::Standard))
        );
        assert_eq!(
            Marker::recognize(" Normal termination of Gaussian 09 at Fri Jun  1 2012."),
            Some(Marker::NormalTermination)
        );
        assert_eq!(
            Marker::recognize(" Atoms too close."),
            Some(Marker::Diagnostic(ErrorKind::AtomsTooClose))
        );
        assert_eq!(Marker::recognize(" Rotational constants (GHZ): 1.0 2.0 3.0"), None);
        assert_eq!(Marker::recognize("   "), None);
    }

    #[test]
    fn convergence_table() {
        let out = open("water_opt.log");
        assert_eq!(out.convergence_steps().len(), 1);
        let step = out.convergence(0).unwrap();
        assert_eq!(step.snapshot, Some(2));
        assert!(step.is_converged());
        let names: Vec<&str> = step.criteria.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["Maximum Force", "RMS Force", "Maximum Displacement", "RMS Displacement"]
        );
        let force = step.criterion("rms force").unwrap();
        assert_approx_eq!(force.value, 0.000008, 1e-12);
        assert_approx_eq!(force.threshold, 0.0003, 1e-12);
        assert!(out.convergence(1).is_err());
        // the scan resumes on the line closing the table
        assert!(out.optimization_completed());
    }

    #[test]
    fn unconverged_steps() {
        let text = " Entering Gaussian System, Link 0=g16\n\
                    \x20        Item               Value     Threshold  Converged?\n\
                    \x20Maximum Force            0.012000     0.000450     NO \n\
                    \x20RMS     Force            0.000100     0.000300     YES\n\
                    \x20Predicted change in Energy=-1.0D-04\n\
                    \x20        Item               Value     Threshold  Converged?\n\
                    \x20Maximum Force            0.000200     0.000450     YES\n";
        let out = GaussianOut::parse(text).unwrap();
        assert_eq!(out.convergence_steps().len(), 2);
        let first = out.convergence(0).unwrap();
        assert_eq!(first.criteria.len(), 2);
        assert!(!first.is_converged());
        assert!(!first.criterion("Maximum Force").unwrap().converged);
        assert_eq!(first.snapshot, None);
        // a table cut by the end of the log is kept
        assert!(out.convergence(1).unwrap().is_converged());
    }

    #[test]
    #[should_panic(expected = "invalid convergence value")]
    fn bad_convergence_value() {
        let text = "         Item               Value     Threshold  Converged?\n\
                    \x20Maximum Force            ********     0.000450     NO \n";
        GaussianOut::parse(text).unwrap();
    }

    #[test]
    #[should_panic(expected = "invalid duration")]
    fn negative_cpu_time() {
        let text = " Entering Gaussian System, Link 0=g16\n\
                    \x20Job cpu time:  0 days  0 hours -1 minutes  2.0 seconds.\n";
        GaussianOut::parse(text).unwrap();
    }

    #[test]
    fn stray_hash_line_is_not_a_route() {
        let text = " Entering Gaussian System, Link 0=g16\n\
                    \x20#p this is not a route echo\n\
                    \x20Standard orientation:\n\
                    \x20----\n\
                    \x20Center Atomic Atomic Coordinates\n\
                    \x20----\n\
                    \x20     1          1           0        0.0    0.0    0.37\n\
                    \x20----\n";
        let out = GaussianOut::parse(text).unwrap();
        assert_eq!(out.route(), None);
        assert_eq!(out.snapshots().len(), 1);
    }

    #[test]
    #[should_panic(expected = "not a Gaussian log")]
    fn not_a_gaussian_log() {
        GaussianOut::parse("3\nwater\nO 0.0 0.0 0.0\n").unwrap();
    }

    #[test]
    #[should_panic(expected = "invalid coordinate")]
    fn bad_coordinate() {
        let text = "                         Standard orientation:\n\
                    \x20---------------------------------------------------------------------\n\
                    \x20Center     Atomic      Atomic             Coordinates (Angstroms)\n\
                    \x20Number     Number       Type             X           Y           Z\n\
                    \x20---------------------------------------------------------------------\n\
                    \x20     1          8           0        0.000000    0.0x0000    0.119262\n";
        GaussianOut::parse(text).unwrap();
    }

    #[test]
    #[should_panic(expected = "previous geometries have 2")]
    fn changing_atom_count() {
        let block = |rows: &str| {
            format!(
                " Standard orientation:\n ----\n Center Atomic Atomic Coordinates\n ----\n{rows} ----\n"
            )
        };
        let two = "      1          1           0        0.0    0.0    0.37\n\
                   \x20     2          1           0        0.0    0.0   -0.37\n";
        let one = "      1          1           0        0.0    0.0    0.37\n";
        let text = format!("{}{}", block(two), block(one));
        GaussianOut::parse(&text).unwrap();
    }
}
