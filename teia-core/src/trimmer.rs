//! Poda iterativa de arestas com extremidade de grau ≤ 1
//!
//! Após convergir, apenas arestas que participam de ciclos sobrevivem. O
//! kernel paralelo usa contadores atômicos com ordem relaxada; corridas de
//! leitura são toleradas porque o algoritmo é monótono (arestas só morrem)
//! e rodadas extras absorvem resíduos de corrida. O conjunto sobrevivente é
//! determinístico; a ordem de visita não é.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};

use rayon::prelude::*;

use crate::edges::Edge;
use crate::params::GraphParams;

/// Kernel paralelo: retorna os índices das arestas sobreviventes após
/// `params.trim_rounds` rodadas de eliminação grau-1
#[must_use]
pub fn trim_parallel(edges: &[Edge], params: &GraphParams) -> Vec<u32> {
    let num_nodes = params.num_nodes as usize;
    let alive: Vec<AtomicBool> = (0..edges.len()).map(|_| AtomicBool::new(true)).collect();
    let deg_u: Vec<AtomicU32> = (0..num_nodes).map(|_| AtomicU32::new(0)).collect();
    let deg_v: Vec<AtomicU32> = (0..num_nodes).map(|_| AtomicU32::new(0)).collect();

    edges.par_iter().for_each(|edge| {
        deg_u[edge.u as usize].fetch_add(1, Ordering::Relaxed);
        deg_v[edge.v as usize].fetch_add(1, Ordering::Relaxed);
    });

    let saturating_dec = |counter: &AtomicU32| {
        let _ = counter.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |d| {
            Some(d.saturating_sub(1))
        });
    };

    for _ in 0..params.trim_rounds {
        let killed = AtomicUsize::new(0);

        // Passo U
        (0..edges.len()).into_par_iter().for_each(|i| {
            if alive[i].load(Ordering::Relaxed) {
                let edge = edges[i];
                if deg_u[edge.u as usize].load(Ordering::Relaxed) <= 1 {
                    alive[i].store(false, Ordering::Relaxed);
                    saturating_dec(&deg_u[edge.u as usize]);
                    saturating_dec(&deg_v[edge.v as usize]);
                    killed.fetch_add(1, Ordering::Relaxed);
                }
            }
        });

        // Passo V
        (0..edges.len()).into_par_iter().for_each(|i| {
            if alive[i].load(Ordering::Relaxed) {
                let edge = edges[i];
                if deg_v[edge.v as usize].load(Ordering::Relaxed) <= 1 {
                    alive[i].store(false, Ordering::Relaxed);
                    saturating_dec(&deg_u[edge.u as usize]);
                    saturating_dec(&deg_v[edge.v as usize]);
                    killed.fetch_add(1, Ordering::Relaxed);
                }
            }
        });

        if killed.load(Ordering::Relaxed) == 0 {
            break;
        }
    }

    alive
        .iter()
        .enumerate()
        .filter(|(_, a)| a.load(Ordering::Relaxed))
        .map(|(i, _)| i as u32)
        .collect()
}

/// Referência sequencial em CPU: produz o mesmo conjunto sobrevivente
#[must_use]
pub fn trim_reference(edges: &[Edge], params: &GraphParams) -> Vec<u32> {
    let num_nodes = params.num_nodes as usize;
    let mut alive = vec![true; edges.len()];
    let mut deg_u = vec![0u32; num_nodes];
    let mut deg_v = vec![0u32; num_nodes];

    for edge in edges {
        deg_u[edge.u as usize] += 1;
        deg_v[edge.v as usize] += 1;
    }

    for _ in 0..params.trim_rounds {
        let mut killed = 0usize;

        for i in 0..edges.len() {
            if alive[i] && deg_u[edges[i].u as usize] <= 1 {
                alive[i] = false;
                deg_u[edges[i].u as usize] = deg_u[edges[i].u as usize].saturating_sub(1);
                deg_v[edges[i].v as usize] = deg_v[edges[i].v as usize].saturating_sub(1);
                killed += 1;
            }
        }

        for i in 0..edges.len() {
            if alive[i] && deg_v[edges[i].v as usize] <= 1 {
                alive[i] = false;
                deg_u[edges[i].u as usize] = deg_u[edges[i].u as usize].saturating_sub(1);
                deg_v[edges[i].v as usize] = deg_v[edges[i].v as usize].saturating_sub(1);
                killed += 1;
            }
        }

        if killed == 0 {
            break;
        }
    }

    alive
        .iter()
        .enumerate()
        .filter(|(_, &a)| a)
        .map(|(i, _)| i as u32)
        .collect()
}
