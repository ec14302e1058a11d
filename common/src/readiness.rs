use std::collections::BTreeSet;

use crate::graph::{Graph, StageId};

/// ¿Se puede compilar `stage` ya mismo?
///
/// Todos los padres de `stage` tienen que estar en `done`, salvo `parent`
/// (el stage que pregunta mientras recorre la cadena, que todavía no terminó).
/// Si `stage` tiene exactamente un hijo, la pregunta sigue hacia ese hijo:
/// una cadena lineal se compila de una vez en un solo pipe, así que sólo está
/// lista si lo está entera. Con cero o varios hijos el recorrido se corta.
///
/// Si el recorrido vuelve a pasar por un stage (ciclo) la respuesta es `false`.
pub fn is_ready(
    graph: &Graph,
    parent: Option<StageId>,
    stage: StageId,
    done: &BTreeSet<StageId>,
) -> bool {
    let mut walked = BTreeSet::new();
    let mut asking = parent;
    let mut current = stage;

    loop {
        if !walked.insert(current) {
            return false;
        }

        let blocked = graph
            .parents_of(current)
            .iter()
            .any(|p| Some(*p) != asking && !done.contains(p));
        if blocked {
            return false;
        }

        let children = graph.children_of(current);
        match (children.len(), children.first()) {
            (1, Some(&only)) => {
                asking = Some(current);
                current = only;
            }
            _ => return true,
        }
    }
}
