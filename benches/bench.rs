use std::sync::atomic::{AtomicU64, Ordering};

use faer::{Col, Mat};
use nlcore::{
    SolverHooks, SolverOptions, SolverState,
    callback::NoOpCallback,
    pool::Pool,
    program::{MehrotraInteriorPoint, Program},
    terminators::EvalBudgetTerminator,
    Solver,
};

fn main() {
    divan::main();
}

#[divan::bench(args = [1, 4, 16, 64])]
fn pool_map(n: usize) {
    let pool = Pool::new(4);
    let counter = AtomicU64::new(0);
    pool.map(n, |_i, _worker| {
        counter.fetch_add(1, Ordering::Relaxed);
    });
    assert_eq!(counter.load(Ordering::Relaxed), n as u64);
}

#[divan::bench(args = [1, 4, 16, 64])]
fn pool_map_chunked(n: usize) {
    let pool = Pool::new(4);
    let counter = AtomicU64::new(0);
    pool.map_chunked(n, 8, |begin, end, _worker| {
        counter.fetch_add((end - begin) as u64, Ordering::Relaxed);
    });
    assert_eq!(counter.load(Ordering::Relaxed), n as u64);
}

/// `minimize sum(x)` s.t. `sum(x) = n/2`, `x >= 0` — a small LP solved
/// end-to-end through the interior-point method.
#[divan::bench(args = [4, 16, 64])]
fn ipm_solve(n: usize) {
    let q = Mat::<f64>::zeros(n, n);
    let c = Col::from_fn(n, |_| 1.0);
    let a = Mat::from_fn(1, n, |_, _| 1.0);
    let b = Col::from_fn(1, |_| n as f64 / 2.0);
    let g = Mat::from_fn(n, n, |i, j| if i == j { -1.0 } else { 0.0 });
    let h = Col::from_fn(n, |_| 0.0);
    let program = Program::new(q, c, a, b, g, h).unwrap();

    let options = SolverOptions::new();
    let x0 = Col::from_fn(n, |_| 0.5);
    let s0 = Col::from_fn(n, |_| 1.0);
    let lambda0 = Col::from_fn(n, |_| 1.0);
    let nu0 = Col::from_fn(1, |_| 0.0);
    let mut state = SolverState::new_program(x0, s0, lambda0, nu0);
    let mut hooks = SolverHooks::new(Box::new(NoOpCallback::new(&options)), Box::new(EvalBudgetTerminator::new(100_000)));
    let mut solver = MehrotraInteriorPoint::new(&program, &options);
    solver.solve(&mut state, &mut hooks).unwrap();
}
