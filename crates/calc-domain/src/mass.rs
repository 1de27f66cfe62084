// mass.rs
use crate::CalcError;

/// Valida el coeficiente de rendimiento: debe estar en `(0, 1]`.
pub fn validate_output_koef(output_koef: f64) -> Result<f64, CalcError> {
  if !output_koef.is_finite() || output_koef <= 0.0 || output_koef > 1.0 {
    return Err(CalcError::InvalidArgument(format!("output_koef debe estar en (0, 1], recibido {}", output_koef)));
  }
  Ok(output_koef)
}

/// Masa de reactivo necesaria para obtener `output_mass` de producto.
///
/// `input = output_mass / conversion_factor / output_koef`
pub fn calculate_mass(output_mass: f64, conversion_factor: f64, output_koef: f64) -> Result<f64, CalcError> {
  if conversion_factor == 0.0 || !conversion_factor.is_finite() {
    return Err(CalcError::InvalidArgument(format!("factor de conversion invalido: {}", conversion_factor)));
  }
  let koef = validate_output_koef(output_koef)?;
  Ok(output_mass / conversion_factor / koef)
}
