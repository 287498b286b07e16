//! Supported locales, prompt templates, and user-facing messages.
//!
//! Everything here is a pure function of its arguments. Users only ever
//! see the fixed messages below, never internal error text.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::RagError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    #[default]
    Ko,
    En,
}

impl Locale {
    pub fn as_str(&self) -> &'static str {
        match self {
            Locale::Ko => "ko",
            Locale::En => "en",
        }
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Locale {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ko" => Ok(Locale::Ko),
            "en" => Ok(Locale::En),
            other => Err(RagError::invalid(
                "locale",
                format!("'{}' does not match ^(ko|en)$", other),
            )),
        }
    }
}

const INSTRUCTIONS_KO: &str = "당신은 이 블로그의 AI 어시스턴트입니다.

역할:
- 주어진 컨텍스트만을 근거로 사용자의 질문에 정확하고 도움이 되는 답변을 제공합니다
- 컨텍스트에 없는 내용은 추측하지 말고 모른다고 솔직하게 말합니다
- 관련된 글이나 문서를 언급할 때는 자연스럽게 인용합니다
- 전문적이면서도 친근한 톤을 유지합니다

답변 스타일:
- 명확하고 구조화된 답변
- 필요하면 코드 예시나 구체적인 사례 포함
- 기술적 정확성 유지";

const INSTRUCTIONS_EN: &str = "You are the AI assistant for this blog.

Role:
- Answer the user's question accurately, using only the given context
- If the answer is not in the context, say you don't know instead of guessing
- Cite the related posts or documents naturally when you mention them
- Keep a professional yet friendly tone

Answer style:
- Clear and structured
- Include code examples or concrete cases when useful
- Stay technically accurate";

/// Instruction block for a locale.
pub fn instructions(locale: Locale) -> &'static str {
    match locale {
        Locale::Ko => INSTRUCTIONS_KO,
        Locale::En => INSTRUCTIONS_EN,
    }
}

/// Build the generation prompt: instructions, then context, then question.
pub fn build_prompt(locale: Locale, context: &str, query: &str) -> String {
    format!(
        "{}\n\nContext:\n{}\n\nQuestion: {}",
        instructions(locale),
        context,
        query
    )
}

/// Shown when retrieval finds nothing above the similarity floor.
pub fn no_results_message(locale: Locale) -> &'static str {
    match locale {
        Locale::Ko => "관련된 콘텐츠를 찾을 수 없습니다. 다른 질문을 시도해보세요.",
        Locale::En => "No relevant content found. Please try a different question.",
    }
}

/// Sent as the final `content` chunk when generation fails.
pub fn generation_failed_message(locale: Locale) -> &'static str {
    match locale {
        Locale::Ko => "죄송합니다. 응답 생성 중 오류가 발생했습니다.",
        Locale::En => "Sorry, an error occurred while generating the response.",
    }
}

/// Returned when the embedding backend or the index cannot be reached.
pub fn upstream_unavailable_message(locale: Locale) -> &'static str {
    match locale {
        Locale::Ko => "검색 서비스를 일시적으로 사용할 수 없습니다. 잠시 후 다시 시도해주세요.",
        Locale::En => "The search service is temporarily unavailable. Please try again later.",
    }
}

/// Returned for any other unexpected failure.
pub fn internal_error_message(locale: Locale) -> &'static str {
    match locale {
        Locale::Ko => "요청을 처리하는 중 오류가 발생했습니다.",
        Locale::En => "An error occurred while processing the request.",
    }
}
