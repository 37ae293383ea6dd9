/**
 * CASCADE - Propagation des pannes le long des dépendances
 *
 * Parcours en largeur depuis tous les secteurs CRITICAL, sur un graphe qui peut
 * contenir des cycles. Chaque secteur est visité au plus une fois.
 *
 * Règles :
 * - un secteur OK atteint devient CRITICAL, `cascaded = true`
 * - un secteur déjà non-OK garde sa raison propre ; le parcours continue à travers lui
 * - la raison cite le plus proche amont en panne, `cascaded_from` la racine
 */

use crate::models::{DependencyEdge, Severity, StatusRecord};
use std::collections::{HashMap, VecDeque};

pub fn cascade_reason(upstream: &str) -> String {
    format!("Cascaded — upstream failure at {upstream}")
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct CascadeReport {
    /// Secteurs passés en panne par cascade, dans l'ordre du parcours
    pub cascaded: Vec<String>,
    pub visited: usize,
}

pub fn propagate(records: &mut [StatusRecord], edges: &[DependencyEdge]) -> CascadeReport {
    let index: HashMap<String, usize> = records
        .iter()
        .enumerate()
        .map(|(i, r)| (r.sector_id.clone(), i))
        .collect();

    let mut adjacency: HashMap<usize, Vec<usize>> = HashMap::new();
    for edge in edges {
        // arêtes orphelines ignorées
        if let (Some(&from), Some(&to)) = (index.get(&edge.from), index.get(&edge.to)) {
            adjacency.entry(from).or_default().push(to);
        }
    }

    let n = records.len();
    let mut visited = vec![false; n];
    // plus proche secteur réellement en panne, et racine de la panne
    let mut blame: Vec<Option<usize>> = vec![None; n];
    let mut origin: Vec<Option<usize>> = vec![None; n];
    let mut queue = VecDeque::new();

    for (i, record) in records.iter().enumerate() {
        if record.severity == Severity::Critical {
            visited[i] = true;
            blame[i] = Some(i);
            origin[i] = Some(i);
            queue.push_back(i);
        }
    }

    let mut report = CascadeReport::default();
    while let Some(current) = queue.pop_front() {
        report.visited += 1;
        let Some(next) = adjacency.get(&current) else { continue };
        for &target in next {
            if visited[target] {
                continue;
            }
            visited[target] = true;
            origin[target] = origin[current];

            if records[target].severity.is_ok() {
                let upstream = blame[current].unwrap_or(current);
                let root = origin[current].unwrap_or(current);
                let upstream_id = records[upstream].sector_id.clone();
                let root_id = records[root].sector_id.clone();

                let record = &mut records[target];
                record.severity = Severity::Critical;
                record.reason = cascade_reason(&upstream_id);
                record.cascaded = true;
                record.cascaded_from = Some(root_id);
                blame[target] = Some(target);
                report.cascaded.push(record.sector_id.clone());
            } else {
                blame[target] = blame[current];
            }
            queue.push_back(target);
        }
    }
    report
}
