//! Busca em profundidade limitada por um ciclo bipartido de 8 arestas
//!
//! O ciclo alterna U–V–U–V–U–V–U–V usando 4 nós distintos de cada
//! partição. Qualquer ciclo válido pode ser retornado; a verificação não
//! depende da escolha do buscador.

use std::collections::{HashMap, HashSet};

use crate::edges::Edge;
use crate::params::CYCLE_LEN;

type Adjacency = HashMap<u32, Vec<(u32, u32)>>;

/// Procura um ciclo simples de exatamente 8 arestas no multiconjunto dado
///
/// Retorna os índices das arestas (posições na fatia de entrada) na ordem
/// do passeio, ou `None` se não existir ciclo. O chamador mapeia índices
/// locais de volta para o grafo completo via tabela de posições.
#[must_use]
pub fn find_cycle(edges: &[Edge]) -> Option<Vec<u32>> {
    let mut u_adj: Adjacency = HashMap::new();
    let mut v_adj: Adjacency = HashMap::new();
    for (idx, edge) in edges.iter().enumerate() {
        u_adj.entry(edge.u).or_default().push((edge.v, idx as u32));
        v_adj.entry(edge.v).or_default().push((edge.u, idx as u32));
    }

    let mut search = CycleSearch {
        u_adj: &u_adj,
        v_adj: &v_adj,
        visited_u: HashSet::new(),
        visited_v: HashSet::new(),
        path: Vec::with_capacity(CYCLE_LEN),
    };

    // Candidatos: nós U com grau ≥ 2 (um ciclo exige duas arestas em cada nó)
    let mut candidates: Vec<u32> = u_adj
        .iter()
        .filter(|(_, incident)| incident.len() >= 2)
        .map(|(&u, _)| u)
        .collect();
    candidates.sort_unstable();

    for start_u in candidates {
        search.visited_u.insert(start_u);
        for &(v0, e0) in &u_adj[&start_u] {
            search.visited_v.insert(v0);
            search.path.push(e0);
            if search.walk_from_v(start_u, v0) {
                return Some(search.path);
            }
            search.path.pop();
            search.visited_v.remove(&v0);
        }
        search.visited_u.remove(&start_u);
    }

    None
}

struct CycleSearch<'a> {
    u_adj: &'a Adjacency,
    v_adj: &'a Adjacency,
    visited_u: HashSet<u32>,
    visited_v: HashSet<u32>,
    path: Vec<u32>,
}

impl CycleSearch<'_> {
    /// Passeio a partir de um nó V, com `path.len()` arestas já usadas
    fn walk_from_v(&mut self, start_u: u32, v: u32) -> bool {
        if self.path.len() == CYCLE_LEN - 1 {
            // Último salto: precisa fechar no U inicial sem reusar aresta
            if let Some(incident) = self.v_adj.get(&v) {
                for &(u, e) in incident {
                    if u == start_u && !self.path.contains(&e) {
                        self.path.push(e);
                        return true;
                    }
                }
            }
            return false;
        }

        let Some(incident) = self.v_adj.get(&v) else {
            return false;
        };
        for &(u, e) in incident {
            if self.visited_u.contains(&u) || self.path.contains(&e) {
                continue;
            }
            // Um nó interno do ciclo precisa de grau remanescente ≥ 2
            if self.u_adj.get(&u).map_or(0, Vec::len) < 2 {
                continue;
            }
            self.visited_u.insert(u);
            self.path.push(e);
            if self.walk_from_u(start_u, u) {
                return true;
            }
            self.path.pop();
            self.visited_u.remove(&u);
        }
        false
    }

    /// Passeio a partir de um nó U intermediário
    fn walk_from_u(&mut self, start_u: u32, u: u32) -> bool {
        let Some(incident) = self.u_adj.get(&u) else {
            return false;
        };
        for &(v, e) in incident {
            if self.visited_v.contains(&v) || self.path.contains(&e) {
                continue;
            }
            if self.v_adj.get(&v).map_or(0, Vec::len) < 2 {
                continue;
            }
            self.visited_v.insert(v);
            self.path.push(e);
            if self.walk_from_v(start_u, v) {
                return true;
            }
            self.path.pop();
            self.visited_v.remove(&v);
        }
        false
    }
}

/// Verifica se 8 arestas induzem um único ciclo bipartido 4+4
///
/// Exige duas partições de 4 nós distintos, grau exatamente 2 em todos os
/// nós induzidos e conectividade (dois 4-ciclos disjuntos são recusados).
#[must_use]
pub fn forms_valid_cycle(edges: &[Edge]) -> bool {
    if edges.len() != CYCLE_LEN {
        return false;
    }

    let mut deg_u: HashMap<u32, u32> = HashMap::new();
    let mut deg_v: HashMap<u32, u32> = HashMap::new();
    for edge in edges {
        *deg_u.entry(edge.u).or_insert(0) += 1;
        *deg_v.entry(edge.v).or_insert(0) += 1;
    }

    if deg_u.len() != CYCLE_LEN / 2 || deg_v.len() != CYCLE_LEN / 2 {
        return false;
    }
    if deg_u.values().any(|&d| d != 2) || deg_v.values().any(|&d| d != 2) {
        return false;
    }

    // Conectividade: um único ciclo de 8 alcança as 8 arestas a partir de
    // qualquer uma; dois 4-ciclos disjuntos não
    let mut reached_edges: HashSet<usize> = HashSet::new();
    let mut frontier_u: Vec<u32> = vec![edges[0].u];
    let mut seen_u: HashSet<u32> = HashSet::new();
    let mut seen_v: HashSet<u32> = HashSet::new();

    while let Some(u) = frontier_u.pop() {
        if !seen_u.insert(u) {
            continue;
        }
        for (i, edge) in edges.iter().enumerate() {
            if edge.u == u {
                reached_edges.insert(i);
                if seen_v.insert(edge.v) {
                    for (j, other) in edges.iter().enumerate() {
                        if other.v == edge.v {
                            reached_edges.insert(j);
                            frontier_u.push(other.u);
                        }
                    }
                }
            }
        }
    }

    reached_edges.len() == CYCLE_LEN
}
