//! Ray-march and decay hot-path benchmarks.

use core_config::Config;
use core_grid::{CellState, OccupancyGrid};
use criterion::{criterion_group, criterion_main, Criterion};

fn wall_grid() -> OccupancyGrid {
    let mut grid = OccupancyGrid::new(&Config::default());
    // A wall arc 4 m ahead plus scattered floor evidence.
    for i in 0..60 {
        let bearing = (i as f32 / 60.0 - 0.5) * 1.2;
        grid.update_from_depth_sample(bearing, 4.0, false);
        grid.update_from_depth_sample(bearing, 2.0, true);
    }
    let (ix, iz) = grid.world_to_grid(0.0, 4.0).unwrap();
    grid.set_state_for_test(ix, iz, CellState::Occupied);
    grid
}

fn bench_nearest_obstacle(c: &mut Criterion) {
    let grid = wall_grid();
    c.bench_function("nearest_obstacle_36_rays", |b| {
        b.iter(|| {
            let mut hits = 0u32;
            for i in 0..36 {
                let bearing = (i as f32 / 35.0 - 0.5) * std::f32::consts::PI;
                if grid
                    .nearest_obstacle((0.0, 0.0), criterion::black_box(bearing), 10.0)
                    .is_finite()
                {
                    hits += 1;
                }
            }
            hits
        })
    });
}

fn bench_decay(c: &mut Criterion) {
    c.bench_function("apply_decay_full_grid", |b| {
        let mut grid = wall_grid();
        b.iter(|| grid.apply_decay(criterion::black_box(1.0 / 30.0)));
    });
}

criterion_group!(benches, bench_nearest_obstacle, bench_decay);
criterion_main!(benches);
