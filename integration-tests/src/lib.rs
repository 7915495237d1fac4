//! End-to-end scenarios for the gateway and booking service live in `tests/`.
