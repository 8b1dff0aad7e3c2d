// Copyright 2021 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use float_cmp::approx_eq;
use proptest::prelude::*;

use qnet_core::expr::{Environment, Expr};
use qnet_core::model::{Bound, Demand, Model, Station, StationType};

fn network(think_time: f64, demands: &[(StationType, f64, f64)]) -> Model {
    let mut model = Model::new();
    model
        .insert_closed_chain("c1", Expr::constant(1.0), Expr::constant(think_time))
        .unwrap();
    for (i, (kind, copies, demand)) in demands.iter().enumerate() {
        let station = model
            .insert_station(&format!("m{i}"), Station::new(*kind, Expr::constant(*copies)))
            .unwrap();
        *station.demand_mut("c1") = Demand::new(Expr::constant(*demand), Expr::constant(1.0));
    }
    model
}

#[test]
fn test_symbolic_bounds() {
    let mut model = network(0.0, &[(StationType::LoadIndependent, 1.0, 0.5)]);
    let cpu = model.stations.get_mut("m0").unwrap();
    cpu.classes.get_mut("c1").unwrap().service_time = Some(Expr::var("$S", true));

    let bound = Bound::new("c1", &model);
    assert_eq!("$S", bound.d_max().to_string());

    let mut env = Environment::new();
    env.set("$S", 0.25);
    assert_eq!(0.25, bound.d_sum().eval_number(&mut env).unwrap());
    assert_eq!(1.0, bound.n_star().eval_number(&mut env).unwrap());
}

proptest! {
    #[test]
    fn test_n_star_meets_both_bounds(
        think_time in 0.0f64..10.0,
        demands in prop::collection::vec((0usize..3, 1.0f64..4.0, 0.01f64..5.0), 1..6)
    ) {
        let kinds = [StationType::Delay, StationType::LoadIndependent, StationType::Multiserver];
        let demands: Vec<(StationType, f64, f64)> = demands
            .iter()
            .map(|(k, copies, d)| (kinds[*k], copies.round(), *d))
            .collect();
        let model = network(think_time, &demands);
        let bound = Bound::new("c1", &model);

        let d_max = bound.d_max().as_const().unwrap();
        let d_sum = bound.d_sum().as_const().unwrap();
        let z = bound.z_sum().as_const().unwrap();
        prop_assert!(d_max <= d_sum + 1e-12);
        if d_max > 0.0 {
            // N*/(D+Z) = 1/Dmax at the crossing point
            let n_star = bound.n_star().as_const().unwrap();
            prop_assert!(approx_eq!(f64, n_star / (d_sum + z), 1.0 / d_max, epsilon = 1e-9));
        }
    }
}
