//! Prompt construction for manifestation passages.
//!
//! [`build_prompt`] is pure: the same profile and context always produce
//! the same prompt, and absent optional fields are rendered as
//! [`PLACEHOLDER`](crate::models::PLACEHOLDER) rather than rejected.

use crate::models::UserProfile;

/// Shown in the context section when retrieval produced nothing.
pub const NO_CONTEXT: &str = "(No related passages available.)";

const PREAMBLE: &str = "\
You are an expert manifestation coach with knowledge of Vedic astrology, positive psychology,
goal alignment, and motivational narrative design.

Your task is to generate a deeply personalized manifestation passage
that inspires confidence, clarity, and purposeful action.

OUTPUT CONSTRAINTS:
- Length: Between 650 and 750 words (about four minutes of spoken audio)
- Perspective: Second person (\"you\", \"your\")
- Tense: Present tense only
- Tone: Uplifting, grounded, confident, emotionally supportive
- Output format: Plain text only
- Do NOT include headings, explanations, labels, or quotes
";

const STRATEGY: &str = "\
NARRATIVE STRATEGY:
- Acknowledge their cosmic imprint through their Nakshatra and Lagna, as energizing traits rather than a horoscope reading
- Weave metaphors of light, growth, and flowing water through their journey
- Connect past achievements to present confidence
- Carry the momentum of recent success forward
- Frame challenges as the fire that forges their character
- Visualize goals as realities already unfolding
- End with a calm, powerful affirmation of identity and direction

QUALITY RULES:
- Use evocative, precise vocabulary
- Avoid generic affirmations; every sentence should feel written for this person
- Avoid mystical guarantees
- Maintain emotional coherence and readability
- Keep the output between 650 and 750 words

Generate the manifestation passage now.";

/// Build the generation prompt from a profile and optional retrieval context.
pub fn build_prompt(profile: &UserProfile, context: &str) -> String {
    let mut prompt = String::with_capacity(PREAMBLE.len() + STRATEGY.len() + 1024);
    prompt.push_str(PREAMBLE);

    prompt.push_str("\nINPUT PARAMETERS (use as semantic context, integrate naturally):\n");
    for (label, value) in profile.labelled_fields() {
        prompt.push_str(&format!("- {}: {}\n", label, value));
    }

    prompt.push_str("\nINSPIRATIONAL CONTEXT (passages from similar paths):\n");
    let context = context.trim();
    if context.is_empty() {
        prompt.push_str(NO_CONTEXT);
    } else {
        prompt.push_str(context);
    }
    prompt.push_str(
        "\n(Draw on the essence of this context only where it reinforces their journey; \
         focus primarily on their own details.)\n\n",
    );

    prompt.push_str(STRATEGY);
    prompt
}
