// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Molecule parsing and graph featurization

pub mod elements;
pub mod featurizer;
pub mod smiles;

pub use featurizer::{MolFeatures, MolGraphFeaturizer};
pub use smiles::{parse_smiles, Atom, Bond, BondOrder, MolGraph, SmilesError};
