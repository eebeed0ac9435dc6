// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Batching of featurized molecules into one disconnected graph

use crate::error::Result;
use crate::molecule::MolFeatures;
use candle_core::{Device, Tensor};

/// Several molecules concatenated into one graph, with the index tensors the
/// message-passing encoder needs
#[derive(Debug, Clone)]
pub struct BatchGraph {
    pub n_mols: usize,
    pub n_atoms: usize,
    pub n_edges: usize,
    /// `(n_atoms, atom_dim)`
    pub atom_features: Tensor,
    /// `(n_edges, bond_dim)`
    pub edge_features: Tensor,
    /// Source atom of each directed edge, u32 `(n_edges)`
    pub edge_src: Tensor,
    /// Destination atom of each directed edge
    pub edge_dst: Tensor,
    /// Index of the reverse edge
    pub edge_rev: Tensor,
    /// Molecule owning each atom, u32 `(n_atoms)`
    pub atom_batch: Tensor,
    /// Atoms per molecule as f32 `(n_mols, 1)`, never zero
    pub atom_counts: Tensor,
}

impl BatchGraph {
    pub fn collate(
        mols: &[&MolFeatures],
        atom_dim: usize,
        bond_dim: usize,
        device: &Device,
    ) -> Result<Self> {
        let n_atoms: usize = mols.iter().map(|m| m.n_atoms).sum();
        let n_edges: usize = mols.iter().map(|m| m.n_edges()).sum();

        let mut atom_features = Vec::with_capacity(n_atoms * atom_dim);
        let mut edge_features = Vec::with_capacity(n_edges * bond_dim);
        let mut edge_src = Vec::with_capacity(n_edges);
        let mut edge_dst = Vec::with_capacity(n_edges);
        let mut edge_rev = Vec::with_capacity(n_edges);
        let mut atom_batch = Vec::with_capacity(n_atoms);
        let mut atom_counts = Vec::with_capacity(mols.len());

        let mut atom_offset = 0u32;
        let mut edge_offset = 0u32;
        for (i, mol) in mols.iter().enumerate() {
            atom_features.extend_from_slice(&mol.atom_features);
            edge_features.extend_from_slice(&mol.edge_features);
            edge_src.extend(mol.edge_src.iter().map(|s| s + atom_offset));
            edge_dst.extend(mol.edge_dst.iter().map(|d| d + atom_offset));
            // edges of a bond are stored as (2b, 2b + 1)
            edge_rev.extend((0..mol.n_edges() as u32).map(|e| (e ^ 1) + edge_offset));
            atom_batch.extend(std::iter::repeat(i as u32).take(mol.n_atoms));
            atom_counts.push(mol.n_atoms.max(1) as f32);

            atom_offset += mol.n_atoms as u32;
            edge_offset += mol.n_edges() as u32;
        }

        tracing::debug!(
            "Collated {} molecules: {} atoms, {} directed edges",
            mols.len(),
            n_atoms,
            n_edges
        );

        Ok(Self {
            n_mols: mols.len(),
            n_atoms,
            n_edges,
            atom_features: Tensor::from_vec(atom_features, (n_atoms, atom_dim), device)?,
            edge_features: Tensor::from_vec(edge_features, (n_edges, bond_dim), device)?,
            edge_src: Tensor::from_vec(edge_src, n_edges, device)?,
            edge_dst: Tensor::from_vec(edge_dst, n_edges, device)?,
            edge_rev: Tensor::from_vec(edge_rev, n_edges, device)?,
            atom_batch: Tensor::from_vec(atom_batch, n_atoms, device)?,
            atom_counts: Tensor::from_vec(atom_counts, (mols.len(), 1), device)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::molecule::{parse_smiles, MolGraphFeaturizer};

    #[test]
    fn test_collate_offsets() {
        let featurizer = MolGraphFeaturizer::new();
        let ethanol = featurizer.featurize(&parse_smiles("CCO").unwrap());
        let methane = featurizer.featurize(&parse_smiles("C").unwrap());
        let propane = featurizer.featurize(&parse_smiles("CCC").unwrap());

        let batch = BatchGraph::collate(
            &[&ethanol, &methane, &propane],
            featurizer.atom_dim(),
            featurizer.bond_dim(),
            &Device::Cpu,
        )
        .unwrap();

        assert_eq!(batch.n_mols, 3);
        assert_eq!(batch.n_atoms, 7);
        assert_eq!(batch.n_edges, 8);
        assert_eq!(batch.atom_features.dims(), &[7, featurizer.atom_dim()]);
        assert_eq!(batch.edge_features.dims(), &[8, featurizer.bond_dim()]);

        let src = batch.edge_src.to_vec1::<u32>().unwrap();
        let dst = batch.edge_dst.to_vec1::<u32>().unwrap();
        let rev = batch.edge_rev.to_vec1::<u32>().unwrap();
        // propane's first bond starts after ethanol (3 atoms) and methane (1)
        assert_eq!(src[4], 4);
        assert_eq!(dst[4], 5);
        for e in 0..8 {
            let r = rev[e] as usize;
            assert_eq!(src[e], dst[r]);
            assert_eq!(dst[e], src[r]);
        }

        assert_eq!(
            batch.atom_batch.to_vec1::<u32>().unwrap(),
            vec![0, 0, 0, 1, 2, 2, 2]
        );
        assert_eq!(
            batch.atom_counts.flatten_all().unwrap().to_vec1::<f32>().unwrap(),
            vec![3.0, 1.0, 3.0]
        );
    }

    #[test]
    fn test_collate_without_bonds() {
        let featurizer = MolGraphFeaturizer::new();
        let ion = featurizer.featurize(&parse_smiles("[Na+]").unwrap());
        let batch =
            BatchGraph::collate(&[&ion, &ion], featurizer.atom_dim(), featurizer.bond_dim(), &Device::Cpu)
                .unwrap();
        assert_eq!(batch.n_edges, 0);
        assert_eq!(batch.edge_features.dims(), &[0, featurizer.bond_dim()]);
    }
}
