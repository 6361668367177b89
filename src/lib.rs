// ANTAGONIST -- WORST-CASE TIMING INTERFERENCE SEARCH
// CO-RUNNING "ENEMY" WORKLOADS ARE TUNED TO MAXIMIZE A HIGH, STATISTICALLY
// STABLE QUANTILE OF A SYSTEM-UNDER-TEST'S EXECUTION TIME.
//
// LIBRARY LAYOUT:
//   estimator   QUANTILE + DISTRIBUTION-FREE CONFIDENCE INTERVAL
//   stopping    HOW MANY SAMPLES ARE ENOUGH
//   template    ENEMY SOURCES AND THEIR PARAMETER SCHEMAS
//   enemy       PER-CORE CONFIGURATIONS AND THEIR NEIGHBOURHOODS
//   harness     RUN THE SUT UNDER A CONFIGURATION (LOCAL OR REMOTE)
//   objective   CONFIGURATION -> SCORE, WITH PROGRESS LOGGING
//   search      RANDOM, HILL CLIMBING, ANNEALING, BAYESIAN, BILEVEL
//   rank        PARETO AGGREGATION ACROSS INTERFERENCE MECHANISMS
//   experiment  JSON EXPERIMENT DESCRIPTIONS, ONE TUNING RUN EACH
//   compare     BASELINE VS BEST-FOUND MEASUREMENT

pub mod compare;
pub mod enemy;
pub mod error;
pub mod estimator;
pub mod experiment;
pub mod harness;
pub mod objective;
pub mod progress;
pub mod rank;
pub mod search;
pub mod stopping;
pub mod template;
