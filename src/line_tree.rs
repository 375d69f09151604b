//! # Line Tree Builder
//!
//! Groups the flat list of classified lines into the document tree
//! (document → article → fragment → part → lyric line).
//!
//! ## Algorithm
//! Recursive descent by level. At level `L` the builder reads lines until one
//! belongs to a level above `L`:
//!
//! - a delimiter at `L` closes the current node and opens a sibling
//! - a delimiter or command that belongs below `L` is handed to a recursive
//!   call at `L + 1`, whose nodes become children of the current node
//! - a command at `L` is appended to the current node; reusing a unique
//!   command opens a sibling (or, at the document level, is rejected with
//!   `duplicate_unique`)
//!
//! A node is checked when it closes. Empty nodes, nodes mixing text and music
//! commands, and nodes missing a required command are discarded with an issue;
//! a parent that lost a child that way is marked `pruned` so its own emptiness
//! is not reported a second time.

use crate::classifier::{ClassifiedLine, CommandLine};
use crate::commands::{level_name, PropsPolicy, Speciality, COMMANDS};
use crate::issue::Issues;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LineTree<T> {
    pub line_number: usize,
    pub level: usize,
    pub lines: Vec<T>,
    /// Head of each unique command in `lines` → its index there.
    pub unique_lines: BTreeMap<&'static str, usize>,
    pub children: Vec<LineTree<T>>,
    /// A child was discarded by a check.
    #[serde(skip)]
    pub pruned: bool,
}

impl<T> LineTree<T> {
    pub fn new(line_number: usize, level: usize) -> Self {
        LineTree {
            line_number,
            level,
            lines: Vec::new(),
            unique_lines: BTreeMap::new(),
            children: Vec::new(),
            pruned: false,
        }
    }

    pub fn level_name(&self) -> &'static str {
        level_name(self.level)
    }

    pub fn unique(&self, head: &str) -> Option<&T> {
        self.unique_lines.get(head).and_then(|i| self.lines.get(*i))
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty() && self.children.is_empty()
    }

    /// Same shape, every line converted by `f`.
    pub fn map_lines<U, F: FnMut(T) -> U>(self, f: &mut F) -> LineTree<U> {
        LineTree {
            line_number: self.line_number,
            level: self.level,
            lines: self.lines.into_iter().map(&mut *f).collect(),
            unique_lines: self.unique_lines,
            children: self.children.into_iter().map(|c| c.map_lines(&mut *f)).collect(),
            pruned: self.pruned,
        }
    }

    /// Visit every node depth first.
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a LineTree<T>)) {
        visit(self);
        for child in &self.children {
            child.walk(visit);
        }
    }
}

pub struct LineTreeBuilder {
    lines: Vec<ClassifiedLine>,
    cursor: usize,
}

impl LineTreeBuilder {
    pub fn new(lines: Vec<ClassifiedLine>) -> Self {
        Self { lines, cursor: 0 }
    }

    pub fn parse(mut self, issues: &mut Issues) -> LineTree<CommandLine> {
        let (mut trees, _) = self.build(0, issues);
        let root = trees.pop().unwrap_or_else(|| LineTree::new(0, 0));
        log::debug!("line tree: {} articles", root.children.len());
        root
    }

    /// Build sibling nodes at `level`. Returns them and whether any was discarded.
    fn build(&mut self, level: usize, issues: &mut Issues) -> (Vec<LineTree<CommandLine>>, bool) {
        let mut state = LevelState {
            level,
            current: None,
            trees: Vec::new(),
            pruned: false,
        };

        while let Some(line) = self.lines.get(self.cursor) {
            match line {
                ClassifiedLine::Delimiter(d) if d.level < level => break,
                ClassifiedLine::Delimiter(d) if d.level == level => {
                    let line_number = d.line_number;
                    self.cursor += 1;
                    state.finalize(issues);
                    state.current = Some(LineTree::new(line_number, level));
                }
                ClassifiedLine::Delimiter(d) => {
                    let line_number = d.line_number;
                    self.descend(&mut state, line_number, issues);
                }
                ClassifiedLine::Command(c) => {
                    let target = c.def().nearest_level(level);
                    if target < level {
                        break;
                    }
                    if target > level {
                        let line_number = c.line_number;
                        self.descend(&mut state, line_number, issues);
                        continue;
                    }
                    let line = c.clone();
                    self.cursor += 1;
                    state.accept(line, issues);
                }
            }
        }
        state.finalize(issues);
        (state.trees, state.pruned)
    }

    fn descend(&mut self, state: &mut LevelState, line_number: usize, issues: &mut Issues) {
        let (children, pruned) = self.build(state.level + 1, issues);
        let current = state.ensure_current(line_number);
        current.children.extend(children);
        current.pruned |= pruned;
    }
}

/// The node being filled at one level, plus the finished siblings.
struct LevelState {
    level: usize,
    current: Option<LineTree<CommandLine>>,
    trees: Vec<LineTree<CommandLine>>,
    pruned: bool,
}

impl LevelState {
    fn ensure_current(&mut self, line_number: usize) -> &mut LineTree<CommandLine> {
        let level = self.level;
        self.current.get_or_insert_with(|| LineTree::new(line_number, level))
    }

    fn accept(&mut self, line: CommandLine, issues: &mut Issues) {
        let def = line.def();
        check_props(&line, issues);

        let clash = self
            .current
            .as_ref()
            .is_some_and(|t| def.unique && t.unique_lines.contains_key(def.head));
        if clash {
            if self.level == 0 {
                issues.error(line.line_number, 0, "duplicate_unique", [def.head]);
                return;
            }
            self.finalize(issues);
        }

        let current = self.ensure_current(line.line_number);
        if def.unique {
            current.unique_lines.insert(def.head, current.lines.len());
        }
        current.lines.push(line);
    }

    fn finalize(&mut self, issues: &mut Issues) {
        let Some(mut tree) = self.current.take() else {
            return;
        };
        if check_tree(&mut tree, issues) {
            self.trees.push(tree);
        } else {
            self.pruned = true;
        }
    }
}

fn check_props(line: &CommandLine, issues: &mut Issues) {
    let def = line.def();
    match (def.props, line.props.is_some()) {
        (PropsPolicy::None, true) => issues.warn(line.line_number, 0, "redundant_props", [def.head]),
        (PropsPolicy::Required, false) => issues.warn(line.line_number, 0, "lack_props", [def.head]),
        _ => {}
    }
}

/// Validate a closing node. `false` means discard it.
fn check_tree(tree: &mut LineTree<CommandLine>, issues: &mut Issues) -> bool {
    let name = tree.level_name();
    if tree.level == 0 {
        return true;
    }
    if tree.is_empty() {
        if !tree.pruned {
            issues.warn(tree.line_number, 0, "empty_tree", [name]);
        }
        return false;
    }

    let has = |s: Speciality| tree.lines.iter().any(|l| l.def().speciality == s);
    let special = has(Speciality::Special);
    if special && has(Speciality::Normal) {
        issues.error(tree.line_number, 0, "wrong_speciality", [name]);
        return false;
    }
    if special && !tree.children.is_empty() {
        issues.warn(tree.line_number, 0, "special_children", [name]);
        tree.children.clear();
    }

    for def in COMMANDS.iter().filter(|d| d.required && d.levels.contains(&tree.level)) {
        if !tree.unique_lines.contains_key(def.head) {
            issues.error(tree.line_number, 0, "lack_required", [def.head, name]);
            return false;
        }
    }
    true
}

/// Every kept node holds the unique key of every command required at its level.
pub fn satisfies_required<T>(tree: &LineTree<T>) -> bool {
    let here = COMMANDS
        .iter()
        .filter(|d| d.required && d.levels.contains(&tree.level) && tree.level > 0)
        .all(|d| tree.unique_lines.contains_key(d.head));
    here && tree.children.iter().all(satisfies_required)
}

#[cfg(test)]
mod tests;
