use std::fmt;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Dir,
}

/// One path the project is expected to contain.
#[derive(Debug, Clone)]
pub struct Expectation {
    pub description: String,
    pub path: PathBuf,
    pub kind: EntryKind,
}

impl Expectation {
    pub fn file(description: impl Into<String>, path: PathBuf) -> Self {
        Self { description: description.into(), path, kind: EntryKind::File }
    }

    pub fn dir(description: impl Into<String>, path: PathBuf) -> Self {
        Self { description: description.into(), path, kind: EntryKind::Dir }
    }

    fn is_present(&self) -> bool {
        match self.kind {
            EntryKind::File => self.path.is_file(),
            EntryKind::Dir => self.path.is_dir(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LayoutEntry {
    pub expectation: Expectation,
    pub present: bool,
}

impl fmt::Display for LayoutEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mark = if self.present { "ok" } else { "MISSING" };
        write!(
            f,
            "[{mark:>7}] {}: {}",
            self.expectation.description,
            self.expectation.path.display()
        )
    }
}

#[derive(Debug, Clone)]
pub struct LayoutReport {
    pub entries: Vec<LayoutEntry>,
}

impl LayoutReport {
    pub fn all_present(&self) -> bool {
        self.entries.iter().all(|e| e.present)
    }

    pub fn missing(&self) -> impl Iterator<Item = &LayoutEntry> {
        self.entries.iter().filter(|e| !e.present)
    }
}

pub fn check_layout(expectations: Vec<Expectation>) -> LayoutReport {
    let entries = expectations
        .into_iter()
        .map(|expectation| {
            let present = expectation.is_present();
            LayoutEntry { expectation, present }
        })
        .collect();
    LayoutReport { entries }
}
