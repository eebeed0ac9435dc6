// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Molecular graph featurizer
//!
//! Atom and bond descriptors use the same multi-hot layout as the common
//! pretrained message-passing encoders (72 atom / 14 bond features), so
//! encoder weights trained elsewhere line up column for column:
//!
//! atom: atomic number | total degree | formal charge | chiral tag |
//!       total H | hybridization | aromatic | mass / 100
//! bond: null-bond bit | bond type | conjugated | in ring | stereo

use super::smiles::{BondOrder, Chirality, Hybridization, MolGraph};

const ATOMIC_NUMBERS: [u8; 37] = [
    1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24, 25, 26,
    27, 28, 29, 30, 31, 32, 33, 34, 35, 36, 53,
];
const DEGREES: [usize; 6] = [0, 1, 2, 3, 4, 5];
const FORMAL_CHARGES: [i8; 5] = [-1, -2, 1, 2, 0];
const CHIRAL_TAGS: usize = 4;
const HYDROGEN_COUNTS: usize = 5;
const HYBRIDIZATIONS: usize = 7;
const BOND_TYPES: usize = 4;
const STEREO_TAGS: usize = 6;

/// Featurized molecule with directed edges (two per bond, reverse edges adjacent)
#[derive(Debug, Clone)]
pub struct MolFeatures {
    pub n_atoms: usize,
    /// Row-major `n_atoms x atom_dim`
    pub atom_features: Vec<f32>,
    /// Row-major `n_edges x bond_dim`
    pub edge_features: Vec<f32>,
    pub edge_src: Vec<u32>,
    pub edge_dst: Vec<u32>,
}

impl MolFeatures {
    pub fn n_edges(&self) -> usize {
        self.edge_src.len()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MolGraphFeaturizer;

impl MolGraphFeaturizer {
    pub fn new() -> Self {
        Self
    }

    pub fn atom_dim(&self) -> usize {
        (ATOMIC_NUMBERS.len() + 1)
            + (DEGREES.len() + 1)
            + (FORMAL_CHARGES.len() + 1)
            + (CHIRAL_TAGS + 1)
            + (HYDROGEN_COUNTS + 1)
            + (HYBRIDIZATIONS + 1)
            + 2
    }

    pub fn bond_dim(&self) -> usize {
        1 + BOND_TYPES + 2 + (STEREO_TAGS + 1)
    }

    pub fn featurize(&self, mol: &MolGraph) -> MolFeatures {
        let atom_dim = self.atom_dim();
        let bond_dim = self.bond_dim();

        let mut atom_features = vec![0.0f32; mol.num_atoms() * atom_dim];
        for idx in 0..mol.num_atoms() {
            self.atom_row(mol, idx, &mut atom_features[idx * atom_dim..(idx + 1) * atom_dim]);
        }

        let n_edges = mol.num_bonds() * 2;
        let mut edge_features = vec![0.0f32; n_edges * bond_dim];
        let mut edge_src = Vec::with_capacity(n_edges);
        let mut edge_dst = Vec::with_capacity(n_edges);

        for (b, bond) in mol.bonds().iter().enumerate() {
            let mut row = vec![0.0f32; bond_dim];
            self.bond_row(bond.order, bond.conjugated, bond.in_ring, &mut row);

            for (k, (src, dst)) in [(bond.begin, bond.end), (bond.end, bond.begin)]
                .into_iter()
                .enumerate()
            {
                let e = 2 * b + k;
                edge_features[e * bond_dim..(e + 1) * bond_dim].copy_from_slice(&row);
                edge_src.push(src as u32);
                edge_dst.push(dst as u32);
            }
        }

        MolFeatures {
            n_atoms: mol.num_atoms(),
            atom_features,
            edge_features,
            edge_src,
            edge_dst,
        }
    }

    fn atom_row(&self, mol: &MolGraph, idx: usize, row: &mut [f32]) {
        let atom = &mol.atoms()[idx];
        let mut offset = 0;

        let z = ATOMIC_NUMBERS
            .iter()
            .position(|&n| n == atom.atomic_number);
        offset += one_hot(row, offset, z, ATOMIC_NUMBERS.len());

        let degree = DEGREES.iter().position(|&d| d == mol.total_degree(idx));
        offset += one_hot(row, offset, degree, DEGREES.len());

        let charge = FORMAL_CHARGES.iter().position(|&c| c == atom.charge);
        offset += one_hot(row, offset, charge, FORMAL_CHARGES.len());

        let chiral = match atom.chirality {
            Chirality::Unspecified => 0,
            Chirality::Clockwise => 1,
            Chirality::CounterClockwise => 2,
            Chirality::Other => 3,
        };
        offset += one_hot(row, offset, Some(chiral), CHIRAL_TAGS);

        let hs = atom.hydrogens as usize;
        offset += one_hot(row, offset, (hs < HYDROGEN_COUNTS).then_some(hs), HYDROGEN_COUNTS);

        // S, SP, SP2, SP2D, SP3, SP3D, SP3D2; SP2D is never perceived
        let hybrid = match mol.hybridization(idx) {
            Hybridization::S => 0,
            Hybridization::Sp => 1,
            Hybridization::Sp2 => 2,
            Hybridization::Sp3 => 4,
            Hybridization::Sp3d => 5,
            Hybridization::Sp3d2 => 6,
        };
        offset += one_hot(row, offset, Some(hybrid), HYBRIDIZATIONS);

        row[offset] = if atom.aromatic { 1.0 } else { 0.0 };
        row[offset + 1] = (atom.mass() * 0.01) as f32;
    }

    fn bond_row(&self, order: BondOrder, conjugated: bool, in_ring: bool, row: &mut [f32]) {
        // row[0] marks a null bond and stays 0 for real bonds
        let type_idx = match order {
            BondOrder::Single => Some(0),
            BondOrder::Double => Some(1),
            BondOrder::Triple => Some(2),
            BondOrder::Aromatic => Some(3),
            BondOrder::Quadruple => None,
        };
        if let Some(t) = type_idx {
            row[1 + t] = 1.0;
        }
        let offset = 1 + BOND_TYPES;
        row[offset] = if conjugated { 1.0 } else { 0.0 };
        row[offset + 1] = if in_ring { 1.0 } else { 0.0 };
        // stereo is not perceived: always STEREONONE
        row[offset + 2] = 1.0;
    }
}

/// Set one bit among `choices + 1` slots (last slot = unknown); returns the width
fn one_hot(row: &mut [f32], offset: usize, index: Option<usize>, choices: usize) -> usize {
    let slot = index.unwrap_or(choices);
    row[offset + slot] = 1.0;
    choices + 1
}
