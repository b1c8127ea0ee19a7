use std::path::Path;
use tracing::warn;

/// Instruction sent along with the video; the answer must follow the step grammar
pub fn default_prompt() -> &'static str {
    r#"Analyse cette vidéo de démonstration d'un logiciel et rédige un mode opératoire.

Réponds UNIQUEMENT dans ce format, sans texte avant ni après :

RESUME: un résumé global de la procédure (plusieurs lignes possibles)
---
TITRE: titre court de l'étape
DESC: description courte de l'action à réaliser
TIME: [MM:SS]
---
TITRE: ...
DESC: ...
TIME: [MM:SS]
---

Règles :
1. Une étape par action visible à l'écran, dans l'ordre chronologique
2. TIME est le moment de la vidéo où l'action est la plus visible
3. TIME utilise toujours le format MM:SS (secondes entre 00 et 59)
4. Sépare chaque bloc par une ligne contenant uniquement ---
5. N'utilise pas de markdown"#
}

/// Prompt from `path` when readable, otherwise the built-in one
pub async fn load_prompt(path: Option<&Path>) -> String {
    let Some(path) = path else {
        return default_prompt().to_string();
    };

    match tokio::fs::read_to_string(path).await {
        Ok(content) if !content.trim().is_empty() => content.trim().to_string(),
        Ok(_) => {
            warn!("Prompt file {} is empty, using default prompt", path.display());
            default_prompt().to_string()
        }
        Err(e) => {
            warn!("Failed to read prompt file {}: {}, using default prompt", path.display(), e);
            default_prompt().to_string()
        }
    }
}
