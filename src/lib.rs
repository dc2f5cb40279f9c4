//! Workspace-level integration tests for `pagepool` live in `tests/`.
