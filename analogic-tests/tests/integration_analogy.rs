//! Integration tests for end-to-end analogical matching
//!
//! Exercises the full pipeline on the classic water-flow/heat-flow analogy:
//! hypothesis generation, structuring, combination, scoring and inference
//! transfer.

use analogic_core::{ConceptGraph, Entity, ItemId, Predicate};
use analogic_match::{best_gmap, match_graphs, InferredExpr, MatchOptions};

/// Water-flow base domain:
/// cause(greater(pressure(beaker), pressure(vial)), flow(beaker, vial, water, pipe))
/// greater(diameter(beaker), diameter(vial))
/// liquid(water), flat-top(water)
fn water_flow() -> (ConceptGraph, WaterIds) {
    let mut g = ConceptGraph::new("water-flow");
    let beaker = g.add_entity(Entity::new("beaker"));
    let vial = g.add_entity(Entity::new("vial"));
    let water = g.add_entity(Entity::new("water"));
    let pipe = g.add_entity(Entity::new("pipe"));

    let pressure = Predicate::function("pressure", 1);
    let p_beaker = g.add_expression(pressure.clone(), &[beaker]).unwrap();
    let p_vial = g.add_expression(pressure, &[vial]).unwrap();
    let gt_pressure = g
        .add_expression(Predicate::relation("greater", 2), &[p_beaker, p_vial])
        .unwrap();
    let flow = g
        .add_expression(Predicate::relation("flow", 4), &[beaker, vial, water, pipe])
        .unwrap();
    let cause = g
        .add_expression(Predicate::logical("cause", 2), &[gt_pressure, flow])
        .unwrap();

    let diameter = Predicate::function("diameter", 1);
    let d_beaker = g.add_expression(diameter.clone(), &[beaker]).unwrap();
    let d_vial = g.add_expression(diameter, &[vial]).unwrap();
    g.add_expression(Predicate::relation("greater", 2), &[d_beaker, d_vial])
        .unwrap();

    g.add_expression(Predicate::attribute("liquid"), &[water])
        .unwrap();
    g.add_expression(Predicate::attribute("flat-top"), &[water])
        .unwrap();

    let ids = WaterIds { cause, flow };
    (g, ids)
}

struct WaterIds {
    cause: ItemId,
    flow: ItemId,
}

/// Heat-flow target domain:
/// greater(temperature(coffee), temperature(ice))
/// flow(coffee, ice, heat, bar)
/// liquid(coffee), flat-top(coffee)
fn heat_flow() -> ConceptGraph {
    let mut g = ConceptGraph::new("heat-flow");
    let coffee = g.add_entity(Entity::new("coffee"));
    let ice = g.add_entity(Entity::new("ice"));
    let heat = g.add_entity(Entity::new("heat"));
    let bar = g.add_entity(Entity::new("bar"));

    let temperature = Predicate::function("temperature", 1);
    let t_coffee = g.add_expression(temperature.clone(), &[coffee]).unwrap();
    let t_ice = g.add_expression(temperature, &[ice]).unwrap();
    g.add_expression(Predicate::relation("greater", 2), &[t_coffee, t_ice])
        .unwrap();
    g.add_expression(Predicate::relation("flow", 4), &[coffee, ice, heat, bar])
        .unwrap();

    g.add_expression(Predicate::attribute("liquid"), &[coffee])
        .unwrap();
    g.add_expression(Predicate::attribute("flat-top"), &[coffee])
        .unwrap();

    g
}

/// The full analogy produces consistent, scored mappings with the causal
/// structure carried across
#[test]
fn test_flow_analogy_end_to_end() {
    let (base, ids) = water_flow();
    let target = heat_flow();

    let result = match_graphs(&base, &target, None, &MatchOptions::default())
        .expect("match should succeed");
    assert!(!result.gmaps.is_empty(), "the analogy admits mappings");

    for gmap in &result.gmaps {
        assert!(gmap.is_consistent());
        assert!(gmap.score >= gmap.mhs.len());
        assert_eq!(gmap.mapping.base, "water-flow");
        assert_eq!(gmap.mapping.target, "heat-flow");
    }

    let best = best_gmap(&result.gmaps).expect("at least one mapping");

    // The deep alignment pairs the two greater/flow skeletons, so the best
    // mapping covers the flow relation
    let pairs = best.pairs(&result.structure);
    assert!(pairs.iter().any(|&(b, _)| b == ids.flow));

    // cause(...) exists only in the base and is carried over as an inference
    assert!(best.inferences.contains(&ids.cause));
    let transferred = best
        .transferred
        .as_ref()
        .expect("the causal structure transfers onto the target");
    assert!(transferred.iter().any(|expr| matches!(
        expr,
        InferredExpr::Expr { functor, .. } if functor.name == "cause"
    )));
}

/// Transferred expressions bottom out in existing target items
#[test]
fn test_transferred_inferences_reference_target_items() {
    let (base, _) = water_flow();
    let target = heat_flow();

    let result = match_graphs(&base, &target, None, &MatchOptions::default()).unwrap();
    let best = best_gmap(&result.gmaps).unwrap();
    let transferred = best.transferred.as_ref().unwrap();

    fn leaves(expr: &InferredExpr, out: &mut Vec<ItemId>) {
        match expr {
            InferredExpr::Mapped(item) => out.push(*item),
            InferredExpr::Expr { args, .. } => {
                for arg in args {
                    leaves(arg, out);
                }
            }
        }
    }

    for expr in transferred {
        let mut items = Vec::new();
        leaves(expr, &mut items);
        for item in items {
            assert!(
                target.graph.node_weight(item).is_some(),
                "transferred leaf must exist in the target graph"
            );
        }
    }
}

/// An unmapped base entity inside an inference suppresses transfer for that
/// mapping only
#[test]
fn test_transfer_suppressed_by_unmapped_entity() {
    let mut base = ConceptGraph::new("base");
    let a = base.add_entity(Entity::new("a"));
    let b = base.add_entity(Entity::new("b"));
    let heat = base.add_entity(Entity::new("heat"));
    let flow = base
        .add_expression(Predicate::relation("flow", 2), &[a, b])
        .unwrap();
    let gt = base
        .add_expression(Predicate::relation("greater", 2), &[a, heat])
        .unwrap();
    base.add_expression(Predicate::logical("cause", 2), &[flow, gt])
        .unwrap();

    let mut target = ConceptGraph::new("target");
    let x = target.add_entity(Entity::new("x"));
    let y = target.add_entity(Entity::new("y"));
    target
        .add_expression(Predicate::relation("flow", 2), &[x, y])
        .unwrap();

    let result = match_graphs(&base, &target, None, &MatchOptions::default()).unwrap();
    let best = best_gmap(&result.gmaps).unwrap();

    // cause(...) and greater(a, heat) are candidate inferences, but heat has
    // no counterpart, so the whole transfer is dropped silently
    assert!(!best.inferences.is_empty());
    assert!(best.transferred.is_none());
}

/// Custom rulesets replace literal similarity wholesale
#[test]
fn test_custom_ruleset_is_used() {
    let (base, _) = water_flow();
    let target = heat_flow();

    // An empty ruleset generates no hypotheses at all
    let empty = analogic_match::Ruleset::new();
    let result = match_graphs(&base, &target, Some(&empty), &MatchOptions::default()).unwrap();
    assert!(result.gmaps.is_empty());
    assert!(result.structure.is_empty());
}
