//! Voice synthesis for a stored passage.

use serde::Serialize;

use crate::app::AppContext;
use crate::error::ServiceResult;
use crate::history;
use crate::tts::Accent;

#[derive(Debug, Clone, Serialize)]
pub struct VoiceResponse {
    pub audio_url: String,
    pub message: String,
}

/// Synthesize passage `passage_id` for `owner`.
///
/// `speaker_identity` names the audio file; the owner id is used when it is
/// absent. A passage owned by someone else is reported as not found.
#[tracing::instrument(name = "generate voice", skip(ctx))]
pub async fn generate_voice(
    ctx: &AppContext,
    owner: &str,
    speaker_identity: Option<&str>,
    passage_id: i64,
    accent: Accent,
) -> ServiceResult<VoiceResponse> {
    let passage = history::get_owned(&ctx.pool, owner, passage_id).await?;

    let identity = speaker_identity.unwrap_or(owner);
    let audio_url = ctx.voice.synthesize(&passage.text, identity, accent).await?;

    Ok(VoiceResponse {
        audio_url,
        message: "Voice generated successfully".to_string(),
    })
}
