// ANTAGONIST PARETO RANK AGGREGATION
// EVERY EXPERIMENT (CACHE, BUS, MEMORY, ...) RANKS THE SAME CANDIDATES BY
// SCORE, DESCENDING. A CANDIDATE'S RANK VECTOR IS ITS POSITION (0 = BEST) IN
// EVERY LIST, THE REFERENCE LIST FIRST.
//
//   DOMINATED   SOME OTHER CANDIDATE IS STRICTLY BETTER IN EVERY DIMENSION
//   FRONTIER    EVERYTHING NOT DOMINATED
//   TIE-BREAK   FRONTIER > 1: ALSO DROP CANDIDATES STRICTLY WORSE THAN SOME
//               OTHER FRONTIER MEMBER IN EXACTLY (DIMS - 1) DIMENSIONS
//
// IF THE TIE-BREAK WOULD EMPTY THE FRONTIER, THE PRE-TIE-BREAK FRONTIER
// STANDS AND THE TIE IS REPORTED AS NOT BROKEN.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, RankError};

#[derive(Clone, Debug, PartialEq)]
pub struct RankedList {
    pub name: String,
    // SORTED BY SCORE DESCENDING, TIES BY KEY
    pub entries: Vec<(String, f64)>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawList {
    Named { name: String, scores: BTreeMap<String, f64> },
    Bare(BTreeMap<String, f64>),
}

impl RankedList {
    pub fn new<I>(name: impl Into<String>, scores: I) -> Self
    where
        I: IntoIterator<Item = (String, f64)>,
    {
        let mut entries: Vec<(String, f64)> = scores.into_iter().collect();
        entries.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        Self { name: name.into(), entries }
    }

    // { "name": ..., "scores": { key: score } } OR A BARE { key: score } MAP
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let raw: RawList = serde_json::from_str(&text).map_err(|source| ConfigError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(match raw {
            RawList::Named { name, scores } => Self::new(name, scores),
            RawList::Bare(scores) => {
                let name = path
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_else(|| path.display().to_string());
                Self::new(name, scores)
            }
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn positions(&self) -> Result<HashMap<&str, usize>, RankError> {
        let mut pos = HashMap::with_capacity(self.entries.len());
        for (i, (key, _)) in self.entries.iter().enumerate() {
            if pos.insert(key.as_str(), i).is_some() {
                return Err(RankError::DuplicateCandidate {
                    key: key.clone(),
                    list: self.name.clone(),
                });
            }
        }
        Ok(pos)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct RankEntry {
    pub key: String,
    pub score: f64,
    pub ranks: Vec<usize>,
}

// a STRICTLY BETTER (LOWER) THAN b IN EVERY DIMENSION
pub fn dominates(a: &[usize], b: &[usize]) -> bool {
    !a.is_empty() && a.iter().zip(b).all(|(x, y)| x < y)
}

// DIMENSIONS IN WHICH a IS STRICTLY WORSE THAN b
pub fn worse_in(a: &[usize], b: &[usize]) -> usize {
    a.iter().zip(b).filter(|(x, y)| x > y).count()
}

// lists[0] IS THE REFERENCE
pub fn rank_vectors(lists: &[RankedList]) -> Result<Vec<RankEntry>, RankError> {
    let reference = lists.first().ok_or(RankError::NoLists)?;
    let positions: Vec<HashMap<&str, usize>> = lists
        .iter()
        .map(RankedList::positions)
        .collect::<Result<_, _>>()?;

    for (list, pos) in lists.iter().zip(&positions).skip(1) {
        if let Some(key) = pos.keys().find(|k| !positions[0].contains_key(*k)) {
            return Err(RankError::UnknownCandidate { key: key.to_string(), list: list.name.clone() });
        }
    }

    reference
        .entries
        .iter()
        .map(|(key, score)| {
            let ranks = lists
                .iter()
                .zip(&positions)
                .map(|(list, pos)| {
                    pos.get(key.as_str()).copied().ok_or_else(|| RankError::MissingCandidate {
                        key: key.clone(),
                        list: list.name.clone(),
                    })
                })
                .collect::<Result<Vec<usize>, RankError>>()?;
            Ok(RankEntry { key: key.clone(), score: *score, ranks })
        })
        .collect()
}

// INDICES OF `entries` NOT DOMINATED BY ANY OTHER MEMBER OF `among`
fn undominated(entries: &[RankEntry], among: &[usize]) -> Vec<usize> {
    among
        .iter()
        .copied()
        .filter(|&i| {
            !among
                .iter()
                .any(|&j| j != i && dominates(&entries[j].ranks, &entries[i].ranks))
        })
        .collect()
}

fn tie_break(entries: &[RankEntry], frontier: &[usize]) -> Vec<usize> {
    frontier
        .iter()
        .copied()
        .filter(|&i| {
            let dims = entries[i].ranks.len();
            !frontier.iter().any(|&j| {
                j != i && worse_in(&entries[i].ranks, &entries[j].ranks) == dims.saturating_sub(1)
            })
        })
        .collect()
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Aggregation {
    pub frontier: Vec<String>,
    pub tie_break_applied: bool,
    pub tie_broken: bool,
    pub ranks: BTreeMap<String, Vec<usize>>,
}

pub fn aggregate(lists: &[RankedList]) -> Result<Aggregation, RankError> {
    let entries = rank_vectors(lists)?;
    let all: Vec<usize> = (0..entries.len()).collect();
    let frontier = undominated(&entries, &all);

    let (frontier, tie_break_applied, tie_broken) = if frontier.len() > 1 {
        let tightened = tie_break(&entries, &frontier);
        if tightened.is_empty() {
            log::warn!("TIE-BREAK ELIMINATED EVERY CANDIDATE, KEEPING THE FULL FRONTIER");
            (frontier, true, false)
        } else {
            let broken = tightened.len() == 1;
            (tightened, true, broken)
        }
    } else {
        (frontier, false, true)
    };

    Ok(Aggregation {
        frontier: frontier.iter().map(|&i| entries[i].key.clone()).collect(),
        tie_break_applied,
        tie_broken,
        ranks: entries.into_iter().map(|e| (e.key, e.ranks)).collect(),
    })
}
