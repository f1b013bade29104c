//! Judge prompts for the open-ended tasks

use crate::analysis::judge::{JudgeSchema, CULTURE_DIMENSIONS, LANGUAGE_USAGE};
use crate::tasks::{Language, TaskId};

#[derive(Debug, thiserror::Error)]
pub enum PromptError {
    #[error("task {0} is not judged by an LLM")]
    UnsupportedTask(TaskId),
}

const SCORING_CRITERIA: &str = "
评分标准（1-5分）：
- 5分：优秀 - 完全符合要求，表现卓越
- 4分：良好 - 基本符合要求，表现较好，有轻微不足
- 3分：一般 - 部分符合要求，表现中等，有明显不足
- 2分：较差 - 少部分符合要求，表现不佳，问题较多
- 1分：很差 - 不符合要求，表现很差，问题严重
";

/// Parenthetical hints shown next to the culture-QA dimension labels
const CULTURE_HINTS: [&str; 6] = [
    "文化知识是否准确",
    "对文化内涵的理解程度",
    "语言使用是否得体",
    "回答是否全面完整",
    "是否体现该文化的内部视角",
    "是否使用正确的目标语言",
];

/// One sample to be judged
#[derive(Debug, Clone, Copy)]
pub struct JudgeInput<'a> {
    pub task: TaskId,
    pub language: &'a str,
    pub question: &'a str,
    pub reference: &'a str,
    pub prediction: &'a str,
    pub subcategory: Option<&'a str>,
}

fn language_name(code: &str) -> String {
    code.parse::<Language>()
        .map(|l| l.spoken_name().to_string())
        .unwrap_or_else(|_| code.to_string())
}

fn language_usage_definition(language: &str) -> String {
    format!(
        "评估回答是否使用了正确的目标语言（{}），是否存在语言混用或使用错误语言的情况",
        language
    )
}

/// Build the judge prompt for one sample
pub fn build_judge_prompt(input: &JudgeInput<'_>) -> Result<String, PromptError> {
    let schema = JudgeSchema::for_task(input.task, input.subcategory)
        .ok_or(PromptError::UnsupportedTask(input.task))?;
    let language = language_name(input.language);

    Ok(match schema {
        JudgeSchema::CultureQa => culture_prompt(input, &language),
        JudgeSchema::InstructionQa(answer_type) => {
            let dimensions = schema.dimensions();
            let descriptions: Vec<String> = dimensions
                .iter()
                .enumerate()
                .map(|(i, d)| {
                    let definition = if d.key == LANGUAGE_USAGE.key {
                        language_usage_definition(&language)
                    } else {
                        d.definition.to_string()
                    };
                    format!("{}. {}：{}", i + 1, d.label, definition)
                })
                .collect();
            let output_format: Vec<String> = dimensions
                .iter()
                .map(|d| format!("{}：[1-5的数字]", d.label))
                .collect();

            format!(
                "请你作为一个专业的{lang}文本生成质量评估专家，对以下模型生成的文本进行全面评分。

任务语言：{lang}
子类别：{subcategory}
评估类型：{answer_type}

问题/提示：
{question}

参考答案：
{reference}

模型生成文本：
{prediction}

{criteria}

请从以下{n}个维度对生成文本质量进行评分（每个维度1-5分）：

{descriptions}

请严格按照以下格式输出评分结果：
{output_format}
分析总结：[简要分析生成文本的优缺点和质量特点，100-200字]
最终分数：[{n}个维度的平均分，保留两位小数]",
                lang = language,
                subcategory = input.subcategory.unwrap_or("未指定"),
                answer_type = answer_type.label(),
                question = input.question,
                reference = input.reference,
                prediction = input.prediction,
                criteria = SCORING_CRITERIA,
                n = dimensions.len(),
                descriptions = descriptions.join("\n"),
                output_format = output_format.join("\n"),
            )
        }
    })
}

fn culture_prompt(input: &JudgeInput<'_>, language: &str) -> String {
    let descriptions: Vec<String> = CULTURE_DIMENSIONS
        .iter()
        .zip(CULTURE_HINTS)
        .enumerate()
        .map(|(i, (d, hint))| {
            let definition = if d.key == LANGUAGE_USAGE.key {
                language_usage_definition(language)
            } else {
                d.definition.to_string()
            };
            format!("{}. {}（{}）：{}", i + 1, d.label, hint, definition)
        })
        .collect();
    let output_format: Vec<String> = CULTURE_DIMENSIONS
        .iter()
        .map(|d| format!("{}：[1-5的数字]", d.label))
        .collect();

    format!(
        "请你作为一个专业的{lang}传统文化专家，对以下模型回答进行全面评分。

任务语言：{lang}

问题：
{question}

参考答案：
{reference}

模型回答：
{prediction}

{criteria}

请从以下6个维度对回答质量进行评分（每个维度1-5分）：

{descriptions}

请严格按照以下格式输出评分结果：
{output_format}
分析总结：[简要分析回答在文化理解和知识表达方面的优缺点，100-200字]
最终分数：[六个维度的平均分，保留两位小数]",
        lang = language,
        question = input.question,
        reference = input.reference,
        prediction = input.prediction,
        criteria = SCORING_CRITERIA,
        descriptions = descriptions.join("\n"),
        output_format = output_format.join("\n"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(task: TaskId, subcategory: Option<&'static str>) -> JudgeInput<'static> {
        JudgeInput {
            task,
            language: "bo",
            question: "问题",
            reference: "参考",
            prediction: "预测",
            subcategory,
        }
    }

    #[test]
    fn test_culture_prompt() {
        let prompt = build_judge_prompt(&input(TaskId::TraditionalCulture, None)).unwrap();
        assert!(prompt.contains("藏语传统文化专家"));
        assert!(prompt.contains("1. 知识准确性（文化知识是否准确）：评估回答中文化知识点的准确性和可靠性"));
        assert!(prompt.contains("6. 语言使用准确性（是否使用正确的目标语言）：评估回答是否使用了正确的目标语言（藏语）"));
        assert!(prompt.ends_with("最终分数：[六个维度的平均分，保留两位小数]"));
    }

    #[test]
    fn test_instruction_prompt_follows_subcategory() {
        let prompt = build_judge_prompt(&input(TaskId::TextGeneration, Some("寻求建议"))).unwrap();
        assert!(prompt.contains("子类别：寻求建议"));
        assert!(prompt.contains("评估类型：建议型回答"));
        assert!(prompt.contains("3. 公平与可负责程度："));
        assert!(prompt.contains("5. 语言使用准确性："));
        assert!(prompt.contains("请从以下5个维度"));

        let prompt = build_judge_prompt(&input(TaskId::TextGeneration, None)).unwrap();
        assert!(prompt.contains("子类别：未指定"));
        assert!(prompt.contains("评估类型：生成型回答"));
        assert!(prompt.contains("请从以下6个维度"));
    }

    #[test]
    fn test_unjudged_task_fails() {
        assert!(build_judge_prompt(&input(TaskId::MathReasoning, None)).is_err());
    }
}
