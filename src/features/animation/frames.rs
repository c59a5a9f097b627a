//! Frame script of the heart animation.
//!
//! A script is a list of [`Phase`]s; each phase is a list of frames, every
//! frame a full message text plus how long it stays on screen. The first
//! frame of the script is sent as a reply, every later one edits it.

use std::time::Duration;

use rand::Rng;

pub const WHITE: &str = "🤍";

/// Heart colours the grid cycles through, in order.
pub const HEARTS: [&str; 11] = [
    "🤎", "🧡", "💙", "🖤", "💛", "💜", "❤️‍🔥", "💚", "❤️‍🩹", "💖", "❤",
];

/// Palette of the random parade.
pub const PARADE: [&str; 8] = ["❤", "💚", "💙", "💜", "❤️‍🩹", "❤️‍🔥", "💖", "💝"];

/// Hearts of the closing carousel.
pub const CAROUSEL: [&str; 10] = ["🩷", "🧡", "💚", "💛", "🩵", "💜", "💙", "🤎", "🤍", "❤️"];

pub const LOVE_WORDS: [&str; 5] = [
    "i",
    "i love",
    "i love you",
    "i love you forever",
    "i love you forever❤️‍🩹",
];

/// Reaction left on the message that triggered the animation.
pub const FINAL_REACTION: &str = "❤️";

const SIZE: usize = 9;

const HEART_SHAPE: [&str; SIZE] = [
    "000000000",
    "001101100",
    "011111110",
    "011111110",
    "011111110",
    "001111100",
    "000111000",
    "000010000",
    "000000000",
];

const OUTLINE: [&str; SIZE] = [
    "000000000",
    "001101100",
    "010010010",
    "010000010",
    "010000010",
    "001000100",
    "000101000",
    "000010000",
    "000000000",
];

const INVERSE: [&str; SIZE] = [
    "111111111",
    "110010011",
    "101101101",
    "101111101",
    "101111101",
    "110111011",
    "111010111",
    "111101111",
    "111111111",
];

/// Frame delays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    /// Base delay between grid frames.
    pub frame: Duration,
    /// Parade frames.
    pub parade: Duration,
    /// Each love word.
    pub word: Duration,
    /// Pause after the full sentence.
    pub sentence: Duration,
    /// Each carousel heart.
    pub carousel: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            frame: Duration::from_millis(200),
            parade: Duration::from_millis(400),
            word: Duration::from_millis(500),
            sentence: Duration::from_secs(2),
            carousel: Duration::from_secs(3),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub text: String,
    pub hold: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Phase {
    pub name: &'static str,
    pub frames: Vec<Frame>,
}

type Grid = Vec<Vec<&'static str>>;

fn paint(map: &[&str; SIZE], mut fill: impl FnMut() -> &'static str) -> Grid {
    map.iter()
        .map(|row| {
            row.chars()
                .map(|c| if c == '1' { fill() } else { WHITE })
                .collect()
        })
        .collect()
}

fn render(grid: &Grid) -> String {
    grid.iter()
        .map(|row| row.concat())
        .collect::<Vec<_>>()
        .join("\n")
}

fn frames(texts: impl IntoIterator<Item = String>, hold: Duration) -> Vec<Frame> {
    texts.into_iter().map(|text| Frame { text, hold }).collect()
}

/// Drops the top row and the last column until nothing is left; the empty
/// grid itself is not a frame.
fn crumble(mut grid: Grid) -> Vec<String> {
    let mut out = Vec::new();
    loop {
        if !grid.is_empty() {
            grid.remove(0);
        }
        for row in &mut grid {
            row.pop();
        }
        grid.retain(|row| !row.is_empty());
        if grid.is_empty() {
            return out;
        }
        out.push(render(&grid));
    }
}

/// Builds the full script; `rng` colours the parade.
pub fn script<R: Rng + ?Sized>(timing: &Timing, rng: &mut R) -> Vec<Phase> {
    let mut phases = Vec::with_capacity(9);

    phases.push(Phase {
        name: "reply",
        frames: frames([WHITE.to_string()], Duration::ZERO),
    });

    let mut build = Vec::with_capacity(2 * (SIZE - 1));
    let mut row = WHITE.to_string();
    for _ in 1..SIZE {
        row.push_str(WHITE);
        build.push(row.clone());
    }
    let full_row = row;
    let mut grid = full_row.clone();
    for _ in 1..SIZE {
        grid.push('\n');
        grid.push_str(&full_row);
        build.push(grid.clone());
    }
    phases.push(Phase {
        name: "build",
        frames: frames(build, timing.frame),
    });

    phases.push(Phase {
        name: "colour",
        frames: frames(
            HEARTS.iter().map(|&h| render(&paint(&HEART_SHAPE, || h))),
            timing.frame,
        ),
    });

    phases.push(Phase {
        name: "parade",
        frames: frames(
            (0..15).map(|_| {
                render(&paint(&HEART_SHAPE, || {
                    PARADE[rng.random_range(0..PARADE.len())]
                }))
            }),
            timing.parade,
        ),
    });

    let last = HEARTS[HEARTS.len() - 1];
    phases.push(Phase {
        name: "pre-end",
        frames: frames([render(&paint(&HEART_SHAPE, || last))], timing.frame),
    });

    phases.push(Phase {
        name: "end",
        frames: frames(
            HEARTS.iter().flat_map(|&h| {
                [
                    render(&paint(&OUTLINE, || h)),
                    render(&paint(&INVERSE, || h)),
                ]
            }),
            timing.frame,
        ),
    });

    phases.push(Phase {
        name: "destroy",
        frames: frames(crumble(paint(&INVERSE, || last)), timing.frame),
    });

    let mut words = frames(LOVE_WORDS.iter().map(|w| w.to_string()), timing.word);
    if let Some(sentence) = words.last_mut() {
        sentence.hold = timing.sentence;
    }
    phases.push(Phase {
        name: "love words",
        frames: words,
    });

    phases.push(Phase {
        name: "carousel",
        frames: frames(CAROUSEL.iter().map(|h| h.to_string()), timing.carousel),
    });

    phases
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn phase<'a>(script: &'a [Phase], name: &str) -> &'a Phase {
        script.iter().find(|p| p.name == name).unwrap()
    }

    #[test]
    fn phases_come_in_order() {
        let script = script(&Timing::default(), &mut StdRng::seed_from_u64(7));
        let names: Vec<_> = script.iter().map(|p| p.name).collect();
        assert_eq!(
            names,
            [
                "reply",
                "build",
                "colour",
                "parade",
                "pre-end",
                "end",
                "destroy",
                "love words",
                "carousel"
            ]
        );
    }

    #[test]
    fn build_grows_to_a_full_grid() {
        let script = script(&Timing::default(), &mut StdRng::seed_from_u64(1));
        let build = &phase(&script, "build").frames;

        assert_eq!(build.len(), 16);
        assert_eq!(build[0].text, WHITE.repeat(2));
        let last = &build[15].text;
        assert_eq!(last.lines().count(), SIZE);
        assert!(last.lines().all(|l| l == WHITE.repeat(SIZE)));
    }

    #[test]
    fn colour_phase_uses_every_heart() {
        let script = script(&Timing::default(), &mut StdRng::seed_from_u64(1));
        let colour = &phase(&script, "colour").frames;

        assert_eq!(colour.len(), HEARTS.len());
        for (frame, heart) in colour.iter().zip(HEARTS) {
            assert_eq!(frame.text.matches(heart).count(), 34);
        }
    }

    #[test]
    fn parade_and_end_sizes() {
        let t = Timing::default();
        let script = script(&t, &mut StdRng::seed_from_u64(3));

        let parade = phase(&script, "parade");
        assert_eq!(parade.frames.len(), 15);
        assert!(parade.frames.iter().all(|f| f.hold == t.parade));
        assert_eq!(phase(&script, "end").frames.len(), 2 * HEARTS.len());
    }

    #[test]
    fn destroy_shrinks_to_a_single_cell() {
        let script = script(&Timing::default(), &mut StdRng::seed_from_u64(1));
        let destroy = &phase(&script, "destroy").frames;

        assert_eq!(destroy.len(), SIZE - 1);
        assert_eq!(destroy[0].text.lines().count(), SIZE - 1);
        assert!(destroy.iter().all(|f| !f.text.is_empty()));
        assert_eq!(destroy.last().unwrap().text.lines().count(), 1);
    }

    #[test]
    fn love_words_hold_the_sentence() {
        let t = Timing::default();
        let script = script(&t, &mut StdRng::seed_from_u64(1));
        let words = &phase(&script, "love words").frames;

        assert_eq!(words.last().unwrap().text, "i love you forever❤️‍🩹");
        assert_eq!(words.last().unwrap().hold, t.sentence);
        assert_eq!(words[0].hold, t.word);
    }
}
