pub(crate) mod instructions;
