//! Built-in prompt templates

/// Shared repository facts, rendered at the top of every built-in template
pub const REPOSITORY_CONTEXT: &str = "\
## Repository

- **Name:** {{repo_name}}
- **Path:** {{repo_path}}
- **Branch:** {{branch}}
- **Primary language:** {{primary_language}}
- **Primary framework:** {{primary_framework}}
- **Files:** {{file_count}}
{{#if languages}}
### Languages
{{#each languages}}
- {{this}}
{{/each}}
{{/if}}
{{#if frameworks}}
### Frameworks and tooling
{{#each frameworks}}
- {{this}}
{{/each}}
{{/if}}
The attached `codebase.txt` holds the source, `structure.txt` the file tree.
";

/// Answer format shared by every built-in template
pub const RESPONSE_INSTRUCTIONS: &str = "\
## Response format

Answer with a single JSON object that conforms to this schema:

```json
{{response_format}}
```

Rules:

1. List every touched file in `changes` with a `change_type` of create, modify, delete or rename.
2. For new files, put the complete file in the change's `content`.
3. For modifications, add a unified diff to `patches` with `--- a/<path>` and `+++ b/<path>` \
headers. Copy context lines exactly from the current file.
4. Put one or more conventional commit messages in `commits`.
5. Use paths relative to the repository root.
";

pub struct BuiltinTemplate {
    pub name: &'static str,
    pub description: &'static str,
    pub source: &'static str,
}

pub const BUILTIN_TEMPLATES: &[BuiltinTemplate] = &[
    BuiltinTemplate {
        name: "code-review",
        description: "Review the codebase for bugs, design problems and style issues",
        source: "\
# Code Review: {{repo_name}}

You are a senior {{primary_language}} engineer reviewing this repository.

{{> repository_context}}
## Task

Review the code for:

- correctness bugs and unhandled edge cases
- error handling and resource management
- readability, naming and structure
- performance problems in hot paths
{{#if custom_request}}

## Additional request

{{custom_request}}
{{/if}}

For each finding that needs a code change, propose the fix.

{{> response_instructions}}",
    },
    BuiltinTemplate {
        name: "bug-fix",
        description: "Locate and fix a bug described in the request",
        source: "\
# Bug Fix: {{repo_name}}

You are debugging a {{primary_language}} project.

{{> repository_context}}
## Bug report

{{#if custom_request}}{{custom_request}}{{else}}Find the most likely defects in the code and fix them.{{/if}}

## Task

1. Identify the root cause and name the responsible code.
2. Fix it with the smallest change that is correct.
3. Add or update tests that would have caught the bug.

{{> response_instructions}}",
    },
    BuiltinTemplate {
        name: "feature",
        description: "Implement a new feature in the style of the existing code",
        source: "\
# Feature Implementation: {{repo_name}}

You are extending a {{primary_language}} project ({{primary_framework}}).

{{> repository_context}}
## Feature request

{{#if custom_request}}{{custom_request}}{{else}}Describe and implement the most valuable missing feature.{{/if}}

## Task

- Follow the conventions already used in the codebase.
- Keep the public API backward compatible unless the request says otherwise.
- Include tests and documentation updates.

{{> response_instructions}}",
    },
    BuiltinTemplate {
        name: "refactor",
        description: "Improve structure without changing behavior",
        source: "\
# Refactoring: {{repo_name}}

{{> repository_context}}
## Task

Refactor the code to improve its structure while keeping behavior identical:

- remove duplication
- split long functions and modules
- clarify names and types
{{#if custom_request}}

Focus: {{custom_request}}
{{/if}}

Do not mix behavior changes into the refactoring.

{{> response_instructions}}",
    },
    BuiltinTemplate {
        name: "documentation",
        description: "Write or improve documentation and doc comments",
        source: "\
# Documentation: {{repo_name}}

{{> repository_context}}
## Task

Improve the project's documentation:

- a README that explains purpose, installation and usage
- doc comments on public {{primary_language}} items
- examples for the main entry points
{{#if custom_request}}

Additional request: {{custom_request}}
{{/if}}

{{> response_instructions}}",
    },
    BuiltinTemplate {
        name: "security-audit",
        description: "Audit the code for vulnerabilities and fix them",
        source: "\
# Security Audit: {{repo_name}}

You are a security engineer auditing this {{primary_language}} codebase.

{{> repository_context}}
## Task

Look for:

- injection (SQL, shell, path traversal)
- authentication and authorization flaws
- secrets committed to the repository
- unsafe deserialization and input validation gaps
- vulnerable dependency usage
{{#if custom_request}}

Scope: {{custom_request}}
{{/if}}

Rate each finding low, medium or high through the change `priority` and fix what you can.

{{> response_instructions}}",
    },
    BuiltinTemplate {
        name: "test-generation",
        description: "Generate unit and integration tests",
        source: "\
# Test Generation: {{repo_name}}

{{> repository_context}}
## Task

Write tests for the code that lacks them:

- unit tests for pure functions and edge cases
- integration tests for the main workflows
- use the test framework the project already uses
{{#if custom_request}}

Focus: {{custom_request}}
{{/if}}

Create new test files with their full content and patch existing ones.

{{> response_instructions}}",
    },
];
