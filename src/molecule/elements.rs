// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Periodic table data used by the SMILES reader and the featurizer

/// (symbol, standard atomic weight), indexed by atomic number - 1
const ELEMENTS: [(&str, f64); 86] = [
    ("H", 1.008), ("He", 4.003), ("Li", 6.94), ("Be", 9.012), ("B", 10.81),
    ("C", 12.011), ("N", 14.007), ("O", 15.999), ("F", 18.998), ("Ne", 20.180),
    ("Na", 22.990), ("Mg", 24.305), ("Al", 26.982), ("Si", 28.085), ("P", 30.974),
    ("S", 32.06), ("Cl", 35.45), ("Ar", 39.948), ("K", 39.098), ("Ca", 40.078),
    ("Sc", 44.956), ("Ti", 47.867), ("V", 50.942), ("Cr", 51.996), ("Mn", 54.938),
    ("Fe", 55.845), ("Co", 58.933), ("Ni", 58.693), ("Cu", 63.546), ("Zn", 65.38),
    ("Ga", 69.723), ("Ge", 72.630), ("As", 74.922), ("Se", 78.971), ("Br", 79.904),
    ("Kr", 83.798), ("Rb", 85.468), ("Sr", 87.62), ("Y", 88.906), ("Zr", 91.224),
    ("Nb", 92.906), ("Mo", 95.95), ("Tc", 98.0), ("Ru", 101.07), ("Rh", 102.906),
    ("Pd", 106.42), ("Ag", 107.868), ("Cd", 112.414), ("In", 114.818), ("Sn", 118.710),
    ("Sb", 121.760), ("Te", 127.60), ("I", 126.904), ("Xe", 131.293), ("Cs", 132.905),
    ("Ba", 137.327), ("La", 138.905), ("Ce", 140.116), ("Pr", 140.908), ("Nd", 144.242),
    ("Pm", 145.0), ("Sm", 150.36), ("Eu", 151.964), ("Gd", 157.25), ("Tb", 158.925),
    ("Dy", 162.500), ("Ho", 164.930), ("Er", 167.259), ("Tm", 168.934), ("Yb", 173.045),
    ("Lu", 174.967), ("Hf", 178.49), ("Ta", 180.948), ("W", 183.84), ("Re", 186.207),
    ("Os", 190.23), ("Ir", 192.217), ("Pt", 195.084), ("Au", 196.967), ("Hg", 200.592),
    ("Tl", 204.38), ("Pb", 207.2), ("Bi", 208.980), ("Po", 209.0), ("At", 210.0),
    ("Rn", 222.0),
];

/// Atomic number for an element symbol (case-sensitive), `*` maps to 0
pub fn atomic_number(symbol: &str) -> Option<u8> {
    if symbol == "*" {
        return Some(0);
    }
    ELEMENTS
        .iter()
        .position(|(s, _)| *s == symbol)
        .map(|idx| (idx + 1) as u8)
}

pub fn symbol(atomic_number: u8) -> &'static str {
    match atomic_number {
        0 => "*",
        z if (z as usize) <= ELEMENTS.len() => ELEMENTS[z as usize - 1].0,
        _ => "?",
    }
}

/// Standard atomic weight; 0 for the wildcard atom
pub fn mass(atomic_number: u8) -> f64 {
    match atomic_number {
        z if z >= 1 && (z as usize) <= ELEMENTS.len() => ELEMENTS[z as usize - 1].1,
        _ => 0.0,
    }
}

/// Default valences for atoms written without brackets
pub fn default_valences(atomic_number: u8) -> &'static [u8] {
    match atomic_number {
        5 => &[3],
        6 => &[4],
        7 => &[3, 5],
        8 => &[2],
        15 => &[3, 5],
        16 => &[2, 4, 6],
        9 | 17 | 35 | 53 => &[1],
        _ => &[],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup() {
        assert_eq!(atomic_number("C"), Some(6));
        assert_eq!(atomic_number("Cl"), Some(17));
        assert_eq!(atomic_number("I"), Some(53));
        assert_eq!(atomic_number("Xx"), None);
        assert_eq!(symbol(8), "O");
        assert!((mass(6) - 12.011).abs() < 1e-9);
    }
}
