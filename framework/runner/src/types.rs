/// Recommended error type for entry points and suite collaborators. This type is compatible with
/// the collaborator traits in [crate::suite] so you can use `?` to propagate errors.
pub type RegressionResult<T> = anyhow::Result<T>;
