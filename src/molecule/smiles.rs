// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! SMILES reader
//!
//! Builds a `MolGraph` from a SMILES string. Supports the organic subset,
//! bracket atoms (isotope, chirality, hydrogen count, charge, atom class),
//! explicit bonds, branches, ring closures (`1`-`9`, `%nn`) and `.`
//! disconnections. Stereo bond markers are read as single bonds. After
//! parsing, ring membership, approximate conjugation and implicit hydrogens
//! are perceived so the featurizer can work from the graph alone.

use super::elements;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SmilesError {
    #[error("empty SMILES")]
    Empty,

    #[error("unexpected character '{ch}' at offset {offset}")]
    UnexpectedChar { ch: char, offset: usize },

    #[error("unknown element '{symbol}' at offset {offset}")]
    UnknownElement { symbol: String, offset: usize },

    #[error("unterminated bracket atom starting at offset {offset}")]
    UnterminatedBracket { offset: usize },

    #[error("ring bond {ring} opened but never closed")]
    UnclosedRing { ring: u16 },

    #[error("ring bond {ring} at offset {offset} closes on the atom that opened it")]
    RingSelfBond { ring: u16, offset: usize },

    #[error("unbalanced branch at offset {offset}")]
    UnbalancedBranch { offset: usize },

    #[error("bond at offset {offset} is not followed by an atom")]
    DanglingBond { offset: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BondOrder {
    Single,
    Double,
    Triple,
    Quadruple,
    Aromatic,
}

impl BondOrder {
    /// Contribution to the valence of each endpoint (aromatic counts as 1,
    /// the extra pi electron is added per aromatic atom)
    fn valence(self) -> u8 {
        match self {
            BondOrder::Single | BondOrder::Aromatic => 1,
            BondOrder::Double => 2,
            BondOrder::Triple => 3,
            BondOrder::Quadruple => 4,
        }
    }

    fn is_multiple(self) -> bool {
        !matches!(self, BondOrder::Single)
    }
}

/// Tetrahedral tag; `@` is counter-clockwise, `@@` clockwise
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Chirality {
    Unspecified,
    Clockwise,
    CounterClockwise,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Hybridization {
    S,
    Sp,
    Sp2,
    Sp3,
    Sp3d,
    Sp3d2,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Atom {
    pub atomic_number: u8,
    pub aromatic: bool,
    pub charge: i8,
    pub isotope: Option<u16>,
    pub chirality: Chirality,
    /// Attached hydrogens (bracket count or implicit)
    pub hydrogens: u8,
    bracket: bool,
}

impl Atom {
    fn organic(atomic_number: u8, aromatic: bool) -> Self {
        Self {
            atomic_number,
            aromatic,
            charge: 0,
            isotope: None,
            chirality: Chirality::Unspecified,
            hydrogens: 0,
            bracket: false,
        }
    }

    pub fn symbol(&self) -> &'static str {
        elements::symbol(self.atomic_number)
    }

    pub fn mass(&self) -> f64 {
        match self.isotope {
            Some(isotope) => isotope as f64,
            None => elements::mass(self.atomic_number),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bond {
    pub begin: usize,
    pub end: usize,
    pub order: BondOrder,
    pub in_ring: bool,
    pub conjugated: bool,
    implicit: bool,
}

impl Bond {
    pub fn other(&self, atom: usize) -> usize {
        if self.begin == atom {
            self.end
        } else {
            self.begin
        }
    }
}

/// Molecular graph with perceived ring, conjugation and hydrogen information
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MolGraph {
    atoms: Vec<Atom>,
    bonds: Vec<Bond>,
    /// Bond indices incident to each atom
    adjacency: Vec<Vec<usize>>,
}

impl MolGraph {
    pub fn atoms(&self) -> &[Atom] {
        &self.atoms
    }

    pub fn bonds(&self) -> &[Bond] {
        &self.bonds
    }

    pub fn num_atoms(&self) -> usize {
        self.atoms.len()
    }

    pub fn num_bonds(&self) -> usize {
        self.bonds.len()
    }

    /// Incident bonds of `atom` as (bond index, neighbour atom)
    pub fn neighbors(&self, atom: usize) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.adjacency[atom]
            .iter()
            .map(move |&b| (b, self.bonds[b].other(atom)))
    }

    /// Heavy-atom neighbours plus attached hydrogens
    pub fn total_degree(&self, atom: usize) -> usize {
        self.adjacency[atom].len() + self.atoms[atom].hydrogens as usize
    }

    pub fn atom_in_ring(&self, atom: usize) -> bool {
        self.adjacency[atom].iter().any(|&b| self.bonds[b].in_ring)
    }

    pub fn hybridization(&self, atom: usize) -> Hybridization {
        let total_degree = self.total_degree(atom);
        if total_degree == 0 || self.atoms[atom].atomic_number <= 1 {
            return Hybridization::S;
        }

        let mut doubles = 0;
        let mut triples = 0;
        let mut aromatic = 0;
        let mut conjugated = false;
        for &b in &self.adjacency[atom] {
            let bond = &self.bonds[b];
            match bond.order {
                BondOrder::Double => doubles += 1,
                BondOrder::Triple | BondOrder::Quadruple => triples += 1,
                BondOrder::Aromatic => aromatic += 1,
                BondOrder::Single => {}
            }
            conjugated |= bond.conjugated;
        }

        let lone_pair_donor = matches!(self.atoms[atom].atomic_number, 7 | 8 | 16);
        if triples > 0 || doubles >= 2 {
            Hybridization::Sp
        } else if aromatic > 0 || doubles == 1 || (conjugated && lone_pair_donor) {
            Hybridization::Sp2
        } else {
            match total_degree {
                0..=4 => Hybridization::Sp3,
                5 => Hybridization::Sp3d,
                _ => Hybridization::Sp3d2,
            }
        }
    }

    fn build(atoms: Vec<Atom>, bonds: Vec<Bond>) -> Self {
        let mut adjacency = vec![Vec::new(); atoms.len()];
        for (idx, bond) in bonds.iter().enumerate() {
            adjacency[bond.begin].push(idx);
            adjacency[bond.end].push(idx);
        }

        let mut graph = Self {
            atoms,
            bonds,
            adjacency,
        };
        graph.perceive_rings();
        graph.demote_chain_aromatic_bonds();
        graph.assign_implicit_hydrogens();
        graph.perceive_conjugation();
        graph
    }

    /// A bond is in a ring unless it is a bridge of the graph
    fn perceive_rings(&mut self) {
        const UNVISITED: usize = usize::MAX;
        let n = self.atoms.len();
        let mut disc = vec![UNVISITED; n];
        let mut low = vec![0usize; n];
        let mut is_bridge = vec![false; self.bonds.len()];
        let mut timer = 0usize;

        for root in 0..n {
            if disc[root] != UNVISITED {
                continue;
            }
            disc[root] = timer;
            low[root] = timer;
            timer += 1;

            // (atom, bond used to reach it, next adjacency slot)
            let mut stack: Vec<(usize, usize, usize)> = vec![(root, UNVISITED, 0)];
            while let Some(top) = stack.last_mut() {
                let (node, parent_bond) = (top.0, top.1);
                if top.2 < self.adjacency[node].len() {
                    let bond_idx = self.adjacency[node][top.2];
                    top.2 += 1;
                    if bond_idx == parent_bond {
                        continue;
                    }
                    let other = self.bonds[bond_idx].other(node);
                    if disc[other] == UNVISITED {
                        disc[other] = timer;
                        low[other] = timer;
                        timer += 1;
                        stack.push((other, bond_idx, 0));
                    } else {
                        low[node] = low[node].min(disc[other]);
                    }
                } else {
                    stack.pop();
                    if let Some(&(parent, _, _)) = stack.last() {
                        low[parent] = low[parent].min(low[node]);
                        if low[node] > disc[parent] {
                            is_bridge[parent_bond] = true;
                        }
                    }
                }
            }
        }

        for (bond, bridge) in self.bonds.iter_mut().zip(is_bridge) {
            bond.in_ring = !bridge;
        }
    }

    /// Unmarked bonds between aromatic atoms of different rings are single
    fn demote_chain_aromatic_bonds(&mut self) {
        for bond in &mut self.bonds {
            if bond.implicit && bond.order == BondOrder::Aromatic && !bond.in_ring {
                bond.order = BondOrder::Single;
            }
        }
    }

    fn assign_implicit_hydrogens(&mut self) {
        for idx in 0..self.atoms.len() {
            if self.atoms[idx].bracket {
                continue;
            }
            let mut valence: u8 = self.adjacency[idx]
                .iter()
                .map(|&b| self.bonds[b].order.valence())
                .sum();
            if self.atoms[idx].aromatic {
                valence += 1;
            }
            let hydrogens = elements::default_valences(self.atoms[idx].atomic_number)
                .iter()
                .find(|&&v| v >= valence)
                .map(|&v| v - valence)
                .unwrap_or(0);
            self.atoms[idx].hydrogens = hydrogens;
        }
    }

    fn perceive_conjugation(&mut self) {
        let unsaturated: Vec<bool> = (0..self.atoms.len())
            .map(|a| {
                self.adjacency[a]
                    .iter()
                    .any(|&b| self.bonds[b].order.is_multiple())
            })
            .collect();
        let donor: Vec<bool> = self
            .atoms
            .iter()
            .map(|a| matches!(a.atomic_number, 7 | 8 | 16))
            .collect();

        for bond in &mut self.bonds {
            if bond.order == BondOrder::Aromatic {
                bond.conjugated = true;
            } else if bond.order == BondOrder::Single {
                let (a, b) = (bond.begin, bond.end);
                bond.conjugated = (unsaturated[a] && unsaturated[b])
                    || (unsaturated[a] && donor[b])
                    || (unsaturated[b] && donor[a]);
            }
        }

        // A multiple bond is conjugated when it takes part in a conjugated single bond
        let conjugated_single: Vec<bool> = (0..self.atoms.len())
            .map(|a| {
                self.adjacency[a].iter().any(|&b| {
                    self.bonds[b].order == BondOrder::Single && self.bonds[b].conjugated
                })
            })
            .collect();
        for bond in &mut self.bonds {
            if matches!(
                bond.order,
                BondOrder::Double | BondOrder::Triple | BondOrder::Quadruple
            ) {
                bond.conjugated = conjugated_single[bond.begin] || conjugated_single[bond.end];
            }
        }
    }
}

/// Parse a SMILES string; text after the first whitespace is ignored
pub fn parse_smiles(input: &str) -> Result<MolGraph, SmilesError> {
    let text = input.split_whitespace().next().unwrap_or("");
    if text.is_empty() {
        return Err(SmilesError::Empty);
    }
    Parser::new(text).parse()
}

struct RingOpening {
    atom: usize,
    order: Option<BondOrder>,
}

struct Parser<'a> {
    text: &'a str,
    pos: usize,
    atoms: Vec<Atom>,
    bonds: Vec<Bond>,
    prev: Option<usize>,
    /// Explicit bond waiting for its second atom, with its offset
    pending: Option<(BondOrder, usize)>,
    branches: Vec<usize>,
    rings: HashMap<u16, RingOpening>,
}

impl<'a> Parser<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            text,
            pos: 0,
            atoms: Vec::new(),
            bonds: Vec::new(),
            prev: None,
            pending: None,
            branches: Vec::new(),
            rings: HashMap::new(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.text[self.pos..].chars().next()
    }

    fn peek_at(&self, ahead: usize) -> Option<char> {
        self.text[self.pos..].chars().nth(ahead)
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }

    fn unexpected(&self, ch: char) -> SmilesError {
        SmilesError::UnexpectedChar {
            ch,
            offset: self.pos,
        }
    }

    fn parse(mut self) -> Result<MolGraph, SmilesError> {
        while let Some(ch) = self.peek() {
            match ch {
                '(' => {
                    let prev = self
                        .prev
                        .ok_or(SmilesError::UnbalancedBranch { offset: self.pos })?;
                    if let Some((_, offset)) = self.pending {
                        return Err(SmilesError::DanglingBond { offset });
                    }
                    self.branches.push(prev);
                    self.pos += 1;
                }
                ')' => {
                    if let Some((_, offset)) = self.pending {
                        return Err(SmilesError::DanglingBond { offset });
                    }
                    let prev = self
                        .branches
                        .pop()
                        .ok_or(SmilesError::UnbalancedBranch { offset: self.pos })?;
                    self.prev = Some(prev);
                    self.pos += 1;
                }
                '-' | '=' | '#' | '$' | ':' | '/' | '\\' => {
                    if self.prev.is_none() || self.pending.is_some() {
                        return Err(self.unexpected(ch));
                    }
                    let order = match ch {
                        '=' => BondOrder::Double,
                        '#' => BondOrder::Triple,
                        '$' => BondOrder::Quadruple,
                        ':' => BondOrder::Aromatic,
                        _ => BondOrder::Single,
                    };
                    self.pending = Some((order, self.pos));
                    self.pos += 1;
                }
                '.' => {
                    if let Some((_, offset)) = self.pending {
                        return Err(SmilesError::DanglingBond { offset });
                    }
                    self.prev = None;
                    self.pos += 1;
                }
                '0'..='9' | '%' => self.ring_closure()?,
                '[' => {
                    let atom = self.bracket_atom()?;
                    self.add_atom(atom);
                }
                _ => {
                    let atom = self.organic_atom()?;
                    self.add_atom(atom);
                }
            }
        }

        if let Some((_, offset)) = self.pending {
            return Err(SmilesError::DanglingBond { offset });
        }
        if !self.branches.is_empty() {
            return Err(SmilesError::UnbalancedBranch { offset: self.pos });
        }
        if let Some(ring) = self.rings.keys().min() {
            return Err(SmilesError::UnclosedRing { ring: *ring });
        }
        if self.atoms.is_empty() {
            return Err(SmilesError::Empty);
        }

        Ok(MolGraph::build(self.atoms, self.bonds))
    }

    fn implicit_order(&self, a: usize, b: usize) -> BondOrder {
        if self.atoms[a].aromatic && self.atoms[b].aromatic {
            BondOrder::Aromatic
        } else {
            BondOrder::Single
        }
    }

    fn add_bond(&mut self, begin: usize, end: usize, explicit: Option<BondOrder>) {
        let order = explicit.unwrap_or_else(|| self.implicit_order(begin, end));
        self.bonds.push(Bond {
            begin,
            end,
            order,
            in_ring: false,
            conjugated: false,
            implicit: explicit.is_none(),
        });
    }

    fn add_atom(&mut self, atom: Atom) {
        let idx = self.atoms.len();
        self.atoms.push(atom);
        if let Some(prev) = self.prev {
            let explicit = self.pending.take().map(|(order, _)| order);
            self.add_bond(prev, idx, explicit);
        }
        self.prev = Some(idx);
    }

    fn ring_closure(&mut self) -> Result<(), SmilesError> {
        let offset = self.pos;
        let current = match self.prev {
            Some(atom) => atom,
            None => return Err(self.unexpected(self.peek().unwrap_or('%'))),
        };

        let ring = if self.peek() == Some('%') {
            self.pos += 1;
            let (Some(d1), Some(d2)) = (self.peek(), self.peek_at(1)) else {
                return Err(SmilesError::UnexpectedChar { ch: '%', offset });
            };
            match (d1.to_digit(10), d2.to_digit(10)) {
                (Some(a), Some(b)) => {
                    self.pos += 2;
                    (a * 10 + b) as u16
                }
                _ => return Err(SmilesError::UnexpectedChar { ch: '%', offset }),
            }
        } else {
            let digit = self.bump().and_then(|c| c.to_digit(10)).unwrap_or(0);
            digit as u16
        };

        let explicit = self.pending.take().map(|(order, _)| order);
        match self.rings.remove(&ring) {
            Some(opening) => {
                if opening.atom == current {
                    return Err(SmilesError::RingSelfBond { ring, offset });
                }
                self.add_bond(opening.atom, current, explicit.or(opening.order));
            }
            None => {
                self.rings.insert(
                    ring,
                    RingOpening {
                        atom: current,
                        order: explicit,
                    },
                );
            }
        }
        Ok(())
    }

    fn organic_atom(&mut self) -> Result<Atom, SmilesError> {
        let offset = self.pos;
        let ch = self.peek().ok_or(SmilesError::Empty)?;
        let (symbol, aromatic, width) = match (ch, self.peek_at(1)) {
            ('C', Some('l')) => ("Cl", false, 2),
            ('B', Some('r')) => ("Br", false, 2),
            ('B', _) => ("B", false, 1),
            ('C', _) => ("C", false, 1),
            ('N', _) => ("N", false, 1),
            ('O', _) => ("O", false, 1),
            ('P', _) => ("P", false, 1),
            ('S', _) => ("S", false, 1),
            ('F', _) => ("F", false, 1),
            ('I', _) => ("I", false, 1),
            ('*', _) => ("*", false, 1),
            ('b', _) => ("B", true, 1),
            ('c', _) => ("C", true, 1),
            ('n', _) => ("N", true, 1),
            ('o', _) => ("O", true, 1),
            ('p', _) => ("P", true, 1),
            ('s', _) => ("S", true, 1),
            _ => return Err(SmilesError::UnexpectedChar { ch, offset }),
        };
        self.pos += width;
        let atomic_number =
            elements::atomic_number(symbol).ok_or_else(|| SmilesError::UnknownElement {
                symbol: symbol.to_string(),
                offset,
            })?;
        Ok(Atom::organic(atomic_number, aromatic))
    }

    fn read_number(&mut self) -> Option<u32> {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            self.pos += 1;
        }
        if self.pos == start {
            None
        } else {
            self.text[start..self.pos].parse().ok()
        }
    }

    fn bracket_atom(&mut self) -> Result<Atom, SmilesError> {
        let open = self.pos;
        self.pos += 1;
        let unterminated = SmilesError::UnterminatedBracket { offset: open };

        let isotope = self.read_number().map(|n| n as u16);

        let symbol_offset = self.pos;
        let first = self.peek().ok_or_else(|| unterminated.clone())?;
        let (atomic_number, aromatic) = if first == '*' {
            self.pos += 1;
            (0, false)
        } else if first.is_ascii_uppercase() {
            self.pos += 1;
            let mut symbol = first.to_string();
            if let Some(second) = self.peek().filter(|c| c.is_ascii_lowercase()) {
                let candidate = format!("{}{}", first, second);
                if elements::atomic_number(&candidate).is_some() {
                    symbol = candidate;
                    self.pos += 1;
                }
            }
            let z = elements::atomic_number(&symbol).ok_or(SmilesError::UnknownElement {
                symbol: symbol.clone(),
                offset: symbol_offset,
            })?;
            (z, false)
        } else if first.is_ascii_lowercase() {
            self.pos += 1;
            let two = self
                .peek()
                .filter(|c| c.is_ascii_lowercase())
                .map(|second| format!("{}{}", first, second))
                .filter(|s| matches!(s.as_str(), "se" | "as" | "te"));
            let symbol = match two {
                Some(s) => {
                    self.pos += 1;
                    s
                }
                None => first.to_string(),
            };
            let capitalized = capitalize(&symbol);
            match (symbol.as_str(), elements::atomic_number(&capitalized)) {
                ("b" | "c" | "n" | "o" | "p" | "s" | "se" | "as" | "te", Some(z)) => (z, true),
                _ => {
                    return Err(SmilesError::UnknownElement {
                        symbol: symbol.clone(),
                        offset: symbol_offset,
                    })
                }
            }
        } else {
            return Err(SmilesError::UnexpectedChar {
                ch: first,
                offset: symbol_offset,
            });
        };

        let mut chirality = Chirality::Unspecified;
        if self.peek() == Some('@') {
            self.pos += 1;
            chirality = Chirality::CounterClockwise;
            if self.peek() == Some('@') {
                self.pos += 1;
                chirality = Chirality::Clockwise;
            } else if matches!(self.peek(), Some(c) if c.is_ascii_uppercase() && c != 'H') {
                // @TH1, @SP2, @OH15 ...
                while matches!(self.peek(), Some(c) if c.is_ascii_uppercase()) {
                    self.pos += 1;
                }
                self.read_number();
                chirality = Chirality::Other;
            }
        }

        let mut hydrogens = 0u8;
        if self.peek() == Some('H') {
            self.pos += 1;
            hydrogens = self.read_number().unwrap_or(1) as u8;
        }

        let mut charge: i32 = 0;
        while let Some(sign) = self.peek().filter(|c| *c == '+' || *c == '-') {
            self.pos += 1;
            let unit = if sign == '+' { 1 } else { -1 };
            match self.read_number() {
                Some(n) => {
                    charge += unit * n as i32;
                    break;
                }
                None => charge += unit,
            }
        }

        if self.peek() == Some(':') {
            self.pos += 1;
            self.read_number();
        }

        match self.bump() {
            Some(']') => {}
            Some(ch) => {
                return Err(SmilesError::UnexpectedChar {
                    ch,
                    offset: self.pos - ch.len_utf8(),
                })
            }
            None => return Err(unterminated),
        }

        Ok(Atom {
            atomic_number,
            aromatic,
            charge: charge.clamp(i8::MIN as i32, i8::MAX as i32) as i8,
            isotope,
            chirality,
            hydrogens,
            bracket: true,
        })
    }
}

fn capitalize(symbol: &str) -> String {
    let mut chars = symbol.chars();
    match chars.next() {
        Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ethanol() {
        let mol = parse_smiles("CCO").unwrap();
        assert_eq!(mol.num_atoms(), 3);
        assert_eq!(mol.num_bonds(), 2);
        assert_eq!(mol.atoms()[0].hydrogens, 3);
        assert_eq!(mol.atoms()[1].hydrogens, 2);
        assert_eq!(mol.atoms()[2].hydrogens, 1);
        assert!(mol.bonds().iter().all(|b| !b.in_ring));
    }

    #[test]
    fn test_benzene_ring() {
        let mol = parse_smiles("c1ccccc1").unwrap();
        assert_eq!(mol.num_atoms(), 6);
        assert_eq!(mol.num_bonds(), 6);
        assert!(mol.bonds().iter().all(|b| b.in_ring && b.order == BondOrder::Aromatic));
        assert!(mol.atoms().iter().all(|a| a.aromatic && a.hydrogens == 1));
        assert_eq!(mol.hybridization(0), Hybridization::Sp2);
    }

    #[test]
    fn test_biphenyl_link_is_single() {
        let mol = parse_smiles("c1ccccc1c1ccccc1").unwrap();
        let link = mol.bonds().iter().find(|b| !b.in_ring).unwrap();
        assert_eq!(link.order, BondOrder::Single);
        assert!(link.conjugated);
    }

    #[test]
    fn test_branches_and_double_bonds() {
        let mol = parse_smiles("CC(=O)O").unwrap();
        assert_eq!(mol.num_atoms(), 4);
        let double = mol.bonds().iter().find(|b| b.order == BondOrder::Double).unwrap();
        assert_eq!((double.begin, double.end), (1, 2));
        assert!(double.conjugated);
        assert_eq!(mol.atoms()[1].hydrogens, 0);
        assert_eq!(mol.atoms()[3].hydrogens, 1);
    }

    #[test]
    fn test_bracket_atoms() {
        let mol = parse_smiles("C[N+](C)(C)CC[O-]").unwrap();
        assert_eq!(mol.atoms()[1].charge, 1);
        assert_eq!(mol.atoms()[1].hydrogens, 0);
        assert_eq!(mol.atoms()[6].charge, -1);

        let mol = parse_smiles("[13CH3][C@@H](N)O").unwrap();
        assert_eq!(mol.atoms()[0].isotope, Some(13));
        assert_eq!(mol.atoms()[0].hydrogens, 3);
        assert_eq!(mol.atoms()[1].chirality, Chirality::Clockwise);

        let mol = parse_smiles("[Fe+++]").unwrap();
        assert_eq!(mol.atoms()[0].charge, 3);
        let mol = parse_smiles("[Cu+2]").unwrap();
        assert_eq!(mol.atoms()[0].charge, 2);
    }

    #[test]
    fn test_two_letter_ring_label_and_disconnection() {
        let mol = parse_smiles("C%10CCC%10.[Na+]").unwrap();
        assert_eq!(mol.num_atoms(), 5);
        assert_eq!(mol.num_bonds(), 4);
        assert!(mol.bonds().iter().all(|b| b.in_ring));
        assert_eq!(mol.total_degree(4), 0);
        assert_eq!(mol.hybridization(4), Hybridization::S);
    }

    #[test]
    fn test_stereo_bonds_read_as_single() {
        let mol = parse_smiles("C/C=C/C").unwrap();
        assert_eq!(mol.bonds()[0].order, BondOrder::Single);
        assert_eq!(mol.bonds()[1].order, BondOrder::Double);
    }

    #[test]
    fn test_trailing_name_ignored() {
        let mol = parse_smiles("CCN ethylamine").unwrap();
        assert_eq!(mol.num_atoms(), 3);
    }

    #[test]
    fn test_errors_carry_offsets() {
        assert_eq!(parse_smiles(""), Err(SmilesError::Empty));
        assert_eq!(parse_smiles("C1CC"), Err(SmilesError::UnclosedRing { ring: 1 }));
        assert_eq!(parse_smiles("CC)"), Err(SmilesError::UnbalancedBranch { offset: 2 }));
        assert_eq!(parse_smiles("CC("), Err(SmilesError::UnbalancedBranch { offset: 3 }));
        assert_eq!(parse_smiles("CC="), Err(SmilesError::DanglingBond { offset: 2 }));
        assert_eq!(
            parse_smiles("CXC"),
            Err(SmilesError::UnexpectedChar { ch: 'X', offset: 1 })
        );
        assert_eq!(
            parse_smiles("C[Xx]"),
            Err(SmilesError::UnknownElement {
                symbol: "X".to_string(),
                offset: 2
            })
        );
        assert_eq!(
            parse_smiles("C[NH4"),
            Err(SmilesError::UnterminatedBracket { offset: 1 })
        );
    }
}
