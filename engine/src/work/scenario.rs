//! Work scenarios: short multiple-choice mini-tasks, pooled by rarity.
//! Higher-rarity scenarios reward more and demand rarer collections.

use rand::Rng;

use crate::catalog::model::Collection;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScenarioKind {
    MusicProduction,
    VarietyShow,
    ConcertPlanning,
    Photoshoot,
}

impl ScenarioKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MusicProduction => "music production",
            Self::VarietyShow => "variety show",
            Self::ConcertPlanning => "concert planning",
            Self::Photoshoot => "photoshoot",
        }
    }
}

/// How a template's collection bonus resolves at generation time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum CollectionBonusSpec {
    None,
    /// Picked uniformly from non-promo, non-fragment collections.
    Random,
}

struct ScenarioTemplate {
    kind: ScenarioKind,
    prompt: &'static str,
    options: [&'static str; 4],
    correct: usize,
    required_tags: &'static [&'static str],
    collection_bonus: CollectionBonusSpec,
}

/// A generated scenario: template plus resolved rarity and collection.
#[derive(Clone, Debug)]
pub struct Scenario {
    pub kind: ScenarioKind,
    pub rarity: u8,
    pub prompt: String,
    pub options: [String; 4],
    pub correct: usize,
    pub required_tags: Vec<String>,
    /// Resolved collection id whose cards boost the payout.
    pub collection_bonus: Option<i64>,
}

const POOL_R1: &[ScenarioTemplate] = &[
    ScenarioTemplate {
        kind: ScenarioKind::MusicProduction,
        prompt: "The demo vocal sits behind the beat. What do you nudge first?",
        options: ["The master fader", "The vocal timing", "The album art", "The tempo map"],
        correct: 1,
        required_tags: &["vocal"],
        collection_bonus: CollectionBonusSpec::None,
    },
    ScenarioTemplate {
        kind: ScenarioKind::VarietyShow,
        prompt: "A guest cancels an hour before recording. Quickest save?",
        options: [
            "Cancel the episode",
            "Extend every segment",
            "Promote the standby guest",
            "Re-shoot last week",
        ],
        correct: 2,
        required_tags: &["variety"],
        collection_bonus: CollectionBonusSpec::None,
    },
    ScenarioTemplate {
        kind: ScenarioKind::Photoshoot,
        prompt: "Golden hour is fading fast. Which setup keeps the warm look?",
        options: [
            "Reflector toward the subject",
            "Overhead fluorescents",
            "Full flash at noon power",
            "Move indoors",
        ],
        correct: 0,
        required_tags: &["photo"],
        collection_bonus: CollectionBonusSpec::None,
    },
    ScenarioTemplate {
        kind: ScenarioKind::ConcertPlanning,
        prompt: "Doors open in ten minutes and the queue wraps the block. First call?",
        options: [
            "Open a second entry lane",
            "Delay doors an hour",
            "Close the merch stand",
            "Start the encore early",
        ],
        correct: 0,
        required_tags: &["stage"],
        collection_bonus: CollectionBonusSpec::None,
    },
];

const POOL_R2: &[ScenarioTemplate] = &[
    ScenarioTemplate {
        kind: ScenarioKind::MusicProduction,
        prompt: "The chorus needs more lift without re-tracking. What stacks cleanly?",
        options: [
            "A detuned duplicate of the lead",
            "More kick drum",
            "A longer intro",
            "Muting the harmonies",
        ],
        correct: 0,
        required_tags: &["vocal", "studio"],
        collection_bonus: CollectionBonusSpec::None,
    },
    ScenarioTemplate {
        kind: ScenarioKind::VarietyShow,
        prompt: "The game segment drags in the edit. What tightens it?",
        options: [
            "Longer reaction shots",
            "Cutting to the scoreboard beats",
            "Adding a second host",
            "Replaying the intro",
        ],
        correct: 1,
        required_tags: &["variety"],
        collection_bonus: CollectionBonusSpec::Random,
    },
    ScenarioTemplate {
        kind: ScenarioKind::Photoshoot,
        prompt: "The white cyclorama reads grey on camera. Fix?",
        options: [
            "Underexpose the subject",
            "Light the backdrop separately",
            "Swap to a black backdrop",
            "Raise the camera",
        ],
        correct: 1,
        required_tags: &["photo", "studio"],
        collection_bonus: CollectionBonusSpec::None,
    },
    ScenarioTemplate {
        kind: ScenarioKind::ConcertPlanning,
        prompt: "Two acts both want the 9pm slot. Who decides cleanest?",
        options: [
            "Coin flip on stage",
            "The printed running order",
            "Whoever shouts loudest",
            "The lighting crew",
        ],
        correct: 1,
        required_tags: &["stage", "tour"],
        collection_bonus: CollectionBonusSpec::None,
    },
];

const POOL_R3: &[ScenarioTemplate] = &[
    ScenarioTemplate {
        kind: ScenarioKind::MusicProduction,
        prompt: "Mastering flags clipping on the streaming target. What gives?",
        options: [
            "Raise the ceiling limiter",
            "Lower the pre-master gain",
            "Export at lower sample rate",
            "Add more compression",
        ],
        correct: 1,
        required_tags: &["studio"],
        collection_bonus: CollectionBonusSpec::Random,
    },
    ScenarioTemplate {
        kind: ScenarioKind::ConcertPlanning,
        prompt: "The venue curfew moved up thirty minutes. What survives the cut?",
        options: [
            "The full encore block",
            "The costume changes",
            "The core setlist",
            "The crowd games",
        ],
        correct: 2,
        required_tags: &["stage", "tour"],
        collection_bonus: CollectionBonusSpec::Random,
    },
    ScenarioTemplate {
        kind: ScenarioKind::Photoshoot,
        prompt: "The concept board says motion blur, the client wants sharp eyes. Shutter?",
        options: [
            "Long exposure, no flash",
            "Rear-curtain flash",
            "Fastest sync speed only",
            "Skip the blur",
        ],
        correct: 1,
        required_tags: &["photo"],
        collection_bonus: CollectionBonusSpec::None,
    },
];

const POOL_R4: &[ScenarioTemplate] = &[
    ScenarioTemplate {
        kind: ScenarioKind::MusicProduction,
        prompt: "Lead single needs a hook rewrite the night before the deadline. Who's in the room?",
        options: [
            "The full fan club",
            "Topliner and producer only",
            "The tour accountant",
            "Nobody, ship as-is",
        ],
        correct: 1,
        required_tags: &["vocal", "studio"],
        collection_bonus: CollectionBonusSpec::Random,
    },
    ScenarioTemplate {
        kind: ScenarioKind::ConcertPlanning,
        prompt: "Pyro permit arrived for only half the dates. Tour-wide plan?",
        options: [
            "Run pyro everywhere anyway",
            "Design a lights-only alternate look",
            "Cancel the unpermitted dates",
            "Move pyro to the lobby",
        ],
        correct: 1,
        required_tags: &["stage", "tour"],
        collection_bonus: CollectionBonusSpec::Random,
    },
];

const POOL_R5: &[ScenarioTemplate] = &[
    ScenarioTemplate {
        kind: ScenarioKind::ConcertPlanning,
        prompt: "Stadium finale: the main screen dies during the ballad. The crew asks for the call.",
        options: [
            "Stop the show",
            "Cut to handheld spotlights and keep singing",
            "Restart the song later",
            "Apologize on the dead screen",
        ],
        correct: 1,
        required_tags: &["stage", "tour"],
        collection_bonus: CollectionBonusSpec::Random,
    },
    ScenarioTemplate {
        kind: ScenarioKind::VarietyShow,
        prompt: "The anniversary special runs live in every region at once. What locks first?",
        options: [
            "The translation feeds",
            "The guest gift bags",
            "The after-party menu",
            "The rerun schedule",
        ],
        correct: 0,
        required_tags: &["variety"],
        collection_bonus: CollectionBonusSpec::Random,
    },
];

const POOLS: [&[ScenarioTemplate]; 5] = [POOL_R1, POOL_R2, POOL_R3, POOL_R4, POOL_R5];

/// Draws a scenario of the given rarity and resolves its collection bonus
/// against the eligible (non-promo, non-fragment) collections.
pub fn generate<R: Rng + ?Sized>(
    rng: &mut R,
    rarity: u8,
    collections: &[Collection],
) -> Scenario {
    let pool = POOLS[(rarity.clamp(1, 5) - 1) as usize];
    let template = &pool[rng.gen_range(0..pool.len())];

    let collection_bonus = match template.collection_bonus {
        CollectionBonusSpec::None => None,
        CollectionBonusSpec::Random => {
            let eligible: Vec<&Collection> = collections
                .iter()
                .filter(|c| !c.promo && !c.fragment)
                .collect();
            if eligible.is_empty() {
                None
            } else {
                Some(eligible[rng.gen_range(0..eligible.len())].collection_id)
            }
        }
    };

    Scenario {
        kind: template.kind,
        rarity: rarity.clamp(1, 5),
        prompt: template.prompt.to_string(),
        options: template.options.map(str::to_string),
        correct: template.correct,
        required_tags: template.required_tags.iter().map(|t| t.to_string()).collect(),
        collection_bonus,
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;

    fn collections() -> Vec<Collection> {
        vec![
            Collection {
                collection_id: 1,
                name: "debut".into(),
                promo: false,
                fragment: false,
            },
            Collection {
                collection_id: 2,
                name: "promo drop".into(),
                promo: true,
                fragment: false,
            },
            Collection {
                collection_id: 3,
                name: "fragments".into(),
                promo: false,
                fragment: true,
            },
        ]
    }

    #[test]
    fn every_pool_has_scenarios_with_four_options() {
        for pool in POOLS {
            assert!(!pool.is_empty());
            for t in pool {
                assert!(t.correct < 4);
                assert!(!t.required_tags.is_empty());
            }
        }
    }

    #[test]
    fn random_bonus_never_lands_on_promo_or_fragment() {
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let cols = collections();
        for _ in 0..200 {
            let s = generate(&mut rng, 5, &cols);
            if let Some(id) = s.collection_bonus {
                assert_eq!(id, 1);
            }
        }
    }

    #[test]
    fn no_eligible_collections_means_no_bonus() {
        let mut rng = ChaCha8Rng::seed_from_u64(6);
        let cols: Vec<Collection> = collections()
            .into_iter()
            .filter(|c| c.promo || c.fragment)
            .collect();
        for _ in 0..50 {
            let s = generate(&mut rng, 4, &cols);
            assert_eq!(s.collection_bonus, None);
        }
    }

    #[test]
    fn rarity_is_clamped_into_pool_range() {
        let mut rng = ChaCha8Rng::seed_from_u64(8);
        assert_eq!(generate(&mut rng, 0, &[]).rarity, 1);
        assert_eq!(generate(&mut rng, 9, &[]).rarity, 5);
    }
}
