// CYBERTWIN EVOLUTIONARY SEARCH
// FIXED-BUDGET GENETIC SEARCH OVER INTEGER CONFIGURATIONS.
//
// THE BREEDER CONTRACT OWNS ALL RANDOMNESS: POPULATION INIT, SELECTION, CROSSOVER,
// MUTATION. THE SEARCH LOOP OWNS EVALUATION ORDER, HISTORY AND THE ALL-TIME BEST.
// EVERY CONFIGURATION HANDED TO THE FITNESS FUNCTION IS CLAMPED TO BOUNDS.

use std::sync::atomic::{AtomicBool, Ordering};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

use crate::model::{Bounds, Candidate, Configuration};
use crate::twin::TwinError;

#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("search cancelled")]
    Cancelled,
    #[error("initial population is empty")]
    EmptyPopulation,
    #[error("fitness evaluation failed: {0}")]
    Fitness(#[from] TwinError),
}

// --- BREEDER CONTRACT ---

pub trait Breeder {
    fn initialize_population(&mut self, bounds: &Bounds, size: usize) -> Vec<Configuration>;

    // history: EVERY CANDIDATE EVALUATED SO FAR IN THIS EPISODE, IN EVALUATION ORDER
    fn select_and_breed(&mut self, history: &[Candidate], bounds: &Bounds, size: usize) -> Vec<Configuration>;
}

pub struct GeneticBreeder {
    rng: StdRng,
    mutation_rate: f64,
    mutation_step: i32,
}

impl GeneticBreeder {
    pub fn new(seed: u64, mutation_rate: f64, mutation_step: i32) -> Self {
        let mutation_rate = if mutation_rate.is_nan() { 0.0 } else { mutation_rate.clamp(0.0, 1.0) };
        Self {
            rng: StdRng::seed_from_u64(seed),
            mutation_rate,
            mutation_step: mutation_step.saturating_abs(),
        }
    }

    fn random_configuration(&mut self, bounds: &Bounds) -> Configuration {
        let genes = bounds.intervals().iter()
            .map(|&(lo, hi)| self.rng.random_range(lo..=hi))
            .collect();
        Configuration::new(genes)
    }

    // GENE i FROM A PARENT DRAWN INDEPENDENTLY FOR EACH GENE.
    // PARENTS ARE CLAMPED, SO EVERY ONE CARRIES bounds.dims() GENES.
    fn crossover(&mut self, parents: &[Configuration], dims: usize) -> Vec<i32> {
        (0..dims)
            .map(|i| parents[self.rng.random_range(0..parents.len())].genes()[i])
            .collect()
    }

    // AT MOST ONE GENE PER CHILD, UNIFORM STEP IN [-step, +step]
    fn mutate(&mut self, genes: &mut [i32]) {
        if genes.is_empty() || !self.rng.random_bool(self.mutation_rate) {
            return;
        }
        let i = self.rng.random_range(0..genes.len());
        let delta = self.rng.random_range(-self.mutation_step..=self.mutation_step);
        genes[i] = genes[i].saturating_add(delta);
    }
}

impl Breeder for GeneticBreeder {
    fn initialize_population(&mut self, bounds: &Bounds, size: usize) -> Vec<Configuration> {
        (0..size).map(|_| self.random_configuration(bounds)).collect()
    }

    fn select_and_breed(&mut self, history: &[Candidate], bounds: &Bounds, size: usize) -> Vec<Configuration> {
        if history.is_empty() {
            return self.initialize_population(bounds, size);
        }

        let mut ranked: Vec<&Candidate> = history.iter().collect();
        ranked.sort_by(|a, b| a.cost.total_cmp(&b.cost));
        let keep = (ranked.len() / 2).max(1);
        let parents: Vec<Configuration> = ranked[..keep].iter()
            .map(|c| bounds.clamp(&c.configuration))
            .collect();

        (0..size)
            .map(|_| {
                let mut genes = self.crossover(&parents, bounds.dims());
                self.mutate(&mut genes);
                bounds.clamp(&Configuration::new(genes))
            })
            .collect()
    }
}

// CACHED CONFIGURATIONS FROM OTHER LABELS FILL UP TO HALF THE POPULATION,
// THE REST COMES FROM THE BREEDER. DUPLICATES ARE DROPPED AFTER CLAMPING.
// RETURNS THE POPULATION AND HOW MANY OF ITS MEMBERS ARE SEEDS.
pub fn seeded_population(
    breeder: &mut dyn Breeder,
    bounds: &Bounds,
    size: usize,
    seeds: &[Configuration],
) -> (Vec<Configuration>, usize) {
    let mut population: Vec<Configuration> = Vec::with_capacity(size);
    for seed in seeds {
        if population.len() >= size / 2 {
            break;
        }
        let seed = bounds.clamp(seed);
        if !population.contains(&seed) {
            population.push(seed);
        }
    }
    let seeded = population.len();
    population.extend(breeder.initialize_population(bounds, size - seeded));
    (population, seeded)
}

// --- SEARCH LOOP ---

#[derive(Clone, Debug)]
pub struct SearchOutcome {
    pub population: Vec<Configuration>,
    pub costs: Vec<f64>,
    pub best: Candidate,
    pub history: Vec<Candidate>,
    pub evaluations: usize,
}

pub struct GeneticSearch<B: Breeder> {
    breeder: B,
}

impl<B: Breeder> GeneticSearch<B> {
    pub fn new(breeder: B) -> Self {
        Self { breeder }
    }

    pub fn breeder_mut(&mut self) -> &mut B {
        &mut self.breeder
    }

    // max_generations COUNTS EVALUATED GENERATIONS, THE INITIAL ONE INCLUDED (AT LEAST ONE).
    // NO CONVERGENCE CHECK: THE BUDGET IS ALWAYS SPENT UNLESS CANCELLED OR FITNESS FAILS.
    pub fn run<F>(
        &mut self,
        initial: Vec<Configuration>,
        bounds: &Bounds,
        max_generations: u32,
        mut fitness: F,
        cancel: &AtomicBool,
    ) -> Result<SearchOutcome, SearchError>
    where
        F: FnMut(&Configuration) -> Result<f64, TwinError>,
    {
        if initial.is_empty() {
            return Err(SearchError::EmptyPopulation);
        }
        let size = initial.len();
        let generations = max_generations.max(1);

        let mut population: Vec<Configuration> = initial.iter().map(|c| bounds.clamp(c)).collect();
        let mut history: Vec<Candidate> = Vec::with_capacity(size * generations as usize);
        let mut best: Option<Candidate> = None;
        let mut costs: Vec<f64> = Vec::with_capacity(size);

        for generation in 0..generations {
            costs.clear();
            for config in &population {
                if cancel.load(Ordering::Relaxed) {
                    info!("SEARCH CANCELLED AT GEN {} AFTER {} EVALUATIONS", generation, history.len());
                    return Err(SearchError::Cancelled);
                }
                let cost = fitness(config)?;
                costs.push(cost);
                let candidate = Candidate::new(config.clone(), cost);
                if best.as_ref().map_or(true, |b| cost < b.cost) {
                    best = Some(candidate.clone());
                }
                history.push(candidate);
            }

            let gen_best = costs.iter().copied().fold(f64::INFINITY, f64::min);
            debug!("GEN {}/{}: BEST {:.1} ALL-TIME {:.1}",
                   generation + 1, generations, gen_best,
                   best.as_ref().map(|b| b.cost).unwrap_or(f64::INFINITY));

            if generation + 1 < generations {
                population = self.breeder.select_and_breed(&history, bounds, size);
            }
        }

        let evaluations = history.len();
        let best = best.ok_or(SearchError::EmptyPopulation)?;
        info!("SEARCH DONE: {} EVALUATIONS, BEST {} COST {:.1}", evaluations, best.configuration, best.cost);
        Ok(SearchOutcome { population, costs, best, history, evaluations })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bowl(c: &Configuration) -> Result<f64, TwinError> {
        // MINIMUM AT [45, 20]
        let g = c.genes();
        Ok(((g[0] - 45).pow(2) + (g[1] - 20).pow(2)) as f64)
    }

    #[test]
    fn init_respects_bounds() {
        let bounds = Bounds::new(vec![(15, 60), (0, 0), (-3, 3)]).unwrap();
        let mut b = GeneticBreeder::new(1, 0.3, 10);
        for c in b.initialize_population(&bounds, 200) {
            assert!(bounds.contains(&c), "{} out of bounds", c);
        }
    }

    #[test]
    fn every_generation_stays_in_bounds() {
        let bounds = Bounds::green_default();
        let mut search = GeneticSearch::new(GeneticBreeder::new(3, 1.0, 100));
        let initial = search.breeder_mut().initialize_population(&bounds, 6);
        let cancel = AtomicBool::new(false);
        let out = search.run(initial, &bounds, 12, bowl, &cancel).unwrap();
        assert_eq!(out.evaluations, 72);
        assert!(out.history.iter().all(|c| bounds.contains(&c.configuration)));
        assert!(out.population.iter().all(|c| bounds.contains(c)));
    }

    #[test]
    fn best_is_all_time_minimum() {
        let bounds = Bounds::green_default();
        let mut search = GeneticSearch::new(GeneticBreeder::new(11, 0.3, 10));
        let initial = search.breeder_mut().initialize_population(&bounds, 5);
        let out = search.run(initial, &bounds, 5, bowl, &AtomicBool::new(false)).unwrap();
        let min = out.history.iter().map(|c| c.cost).fold(f64::INFINITY, f64::min);
        assert_eq!(out.best.cost, min);
        assert_eq!(out.costs.len(), 5);
    }

    #[test]
    fn selection_breeds_only_from_best_half() {
        let bounds = Bounds::green_default();
        let history = vec![
            Candidate::new(Configuration::new(vec![20, 20]), 1.0),
            Candidate::new(Configuration::new(vec![60, 60]), 50.0),
            Candidate::new(Configuration::new(vec![40, 40]), 2.0),
            Candidate::new(Configuration::new(vec![15, 15]), 90.0),
        ];
        // NO MUTATION: CHILDREN ARE GENE MIXES OF THE TWO CHEAPEST
        let mut b = GeneticBreeder::new(5, 0.0, 10);
        for child in b.select_and_breed(&history, &bounds, 20) {
            for &g in child.genes() {
                assert!(g == 20 || g == 40, "gene {} not from a kept parent", g);
            }
        }
    }

    #[test]
    fn crossover_draws_a_parent_per_gene() {
        let bounds = Bounds::green_default();
        // FOUR KEPT PARENTS, PARENT k IS [15 + 5k, 40 + 5k]
        let mut history: Vec<Candidate> = (0..4)
            .map(|k| Candidate::new(Configuration::new(vec![15 + 5 * k, 40 + 5 * k]), k as f64))
            .collect();
        history.extend((0..4).map(|_| Candidate::new(Configuration::new(vec![60, 60]), 100.0)));

        let mut b = GeneticBreeder::new(13, 0.0, 10);
        let children = b.select_and_breed(&history, &bounds, 400);
        let mut same_parent = 0;
        for child in &children {
            let g = child.genes();
            let (k0, k1) = ((g[0] - 15) / 5, (g[1] - 40) / 5);
            assert!((0..4).contains(&k0) && (0..4).contains(&k1), "{} not from a kept parent", child);
            if k0 == k1 {
                same_parent += 1;
            }
        }
        // INDEPENDENT DRAWS: ABOUT 1 IN 4 CHILDREN TAKE BOTH GENES FROM ONE PARENT
        assert!(same_parent > 60 && same_parent < 150, "{} of 400 single-parent children", same_parent);
    }

    #[test]
    fn same_seed_same_children() {
        let bounds = Bounds::green_default();
        let history = vec![
            Candidate::new(Configuration::new(vec![25, 50]), 3.0),
            Candidate::new(Configuration::new(vec![55, 18]), 4.0),
        ];
        let a = GeneticBreeder::new(9, 0.5, 10).select_and_breed(&history, &bounds, 8);
        let b = GeneticBreeder::new(9, 0.5, 10).select_and_breed(&history, &bounds, 8);
        assert_eq!(a, b);
    }

    #[test]
    fn cancel_aborts_before_first_evaluation() {
        let bounds = Bounds::green_default();
        let mut search = GeneticSearch::new(GeneticBreeder::new(1, 0.3, 10));
        let mut calls = 0;
        let err = search.run(
            vec![Configuration::new(vec![30, 30])],
            &bounds,
            5,
            |c| { calls += 1; bowl(c) },
            &AtomicBool::new(true),
        ).unwrap_err();
        assert!(matches!(err, SearchError::Cancelled));
        assert_eq!(calls, 0);
    }

    #[test]
    fn empty_population_is_an_error() {
        let mut search = GeneticSearch::new(GeneticBreeder::new(1, 0.3, 10));
        let err = search.run(Vec::new(), &Bounds::green_default(), 5, bowl, &AtomicBool::new(false)).unwrap_err();
        assert!(matches!(err, SearchError::EmptyPopulation));
    }

    #[test]
    fn fitness_failure_propagates() {
        let mut search = GeneticSearch::new(GeneticBreeder::new(1, 0.3, 10));
        let err = search.run(
            vec![Configuration::new(vec![30, 30])],
            &Bounds::green_default(),
            3,
            |_| Err(TwinError::EmptyReplicationSet),
            &AtomicBool::new(false),
        ).unwrap_err();
        assert!(matches!(err, SearchError::Fitness(TwinError::EmptyReplicationSet)));
    }

    #[test]
    fn seeded_population_caps_seeds_at_half() {
        let bounds = Bounds::green_default();
        let mut b = GeneticBreeder::new(2, 0.3, 10);
        let seeds = vec![
            Configuration::new(vec![50, 20]),
            Configuration::new(vec![50, 20]),
            Configuration::new(vec![99, 1]),
            Configuration::new(vec![30, 30]),
        ];
        let (pop, seeded) = seeded_population(&mut b, &bounds, 5, &seeds);
        assert_eq!(pop.len(), 5);
        assert_eq!(seeded, 2);
        assert_eq!(pop[0].genes(), &[50, 20]);
        assert_eq!(pop[1].genes(), &[60, 15]);
        assert!(pop.iter().all(|c| bounds.contains(c)));
    }

    #[test]
    fn seeded_count_excludes_duplicates() {
        let bounds = Bounds::green_default();
        let mut b = GeneticBreeder::new(2, 0.3, 10);
        // [99, 1] CLAMPS ONTO [60, 15]
        let seeds = vec![
            Configuration::new(vec![60, 15]),
            Configuration::new(vec![60, 15]),
            Configuration::new(vec![99, 1]),
        ];
        let (pop, seeded) = seeded_population(&mut b, &bounds, 6, &seeds);
        assert_eq!(seeded, 1);
        assert_eq!(pop.len(), 6);
        assert_eq!(pop[0].genes(), &[60, 15]);

        let (pop, seeded) = seeded_population(&mut b, &bounds, 6, &[]);
        assert_eq!(seeded, 0);
        assert_eq!(pop.len(), 6);
    }
}
