//! Ready-made programs.

use crate::circuit::{BuildContext, BuildError, Circuit};

/// Player guesses the color the computer picked and learns only whether the guess was right.
///
/// Parties `Player` and `Computer`, secret integer inputs `guess` and `secret_color`,
/// output `guess_result` (1 for a correct guess, 0 otherwise) addressed to `Player`.
pub fn guess_the_color() -> Result<Circuit, BuildError> {
    let mut ctx = BuildContext::new();
    let player = ctx.party("Player")?;
    let computer = ctx.party("Computer")?;

    let guess = ctx.secret_integer("guess", player)?;
    let secret_color = ctx.secret_integer("secret_color", computer)?;

    let correct = ctx.public_equals(guess, secret_color)?;
    let one = ctx.integer(1)?;
    let zero = ctx.integer(0)?;
    let result = ctx.if_else(correct, one, zero)?;
    ctx.output(result, "guess_result", player)?;

    Ok(ctx.finish())
}

/// Colors of `guess_the_color`, numbered from 1.
pub const COLORS: [&str; 6] = ["Red", "Blue", "Green", "Yellow", "Orange", "Purple"];

pub fn color_name(color: i64) -> Option<&'static str> {
    usize::try_from(color)
        .ok()
        .and_then(|color| color.checked_sub(1))
        .and_then(|index| COLORS.get(index).copied())
}

/// Look up a bundled program by name.
pub fn by_name(name: &str) -> Option<Result<Circuit, BuildError>> {
    match name {
        "guess_the_color" => Some(guess_the_color()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::{
        circuit::PlainValue,
        compiler::{compile, CompileOptions},
        plaintext,
    };

    #[test]
    fn test_guess_the_color_plaintext() {
        let circuit = guess_the_color().unwrap();
        for (guess, secret, expected) in [(7, 7, 1), (3, 7, 0)] {
            let inputs = BTreeMap::from([
                ("guess".to_string(), PlainValue::Integer(guess)),
                ("secret_color".to_string(), PlainValue::Integer(secret)),
            ]);
            let outputs = plaintext::evaluate(&circuit, &inputs).unwrap();
            assert_eq!(outputs["guess_result"], PlainValue::Integer(expected));
        }
    }

    #[test]
    fn test_guess_the_color_is_cheap() {
        let program = compile(&guess_the_color().unwrap(), &CompileOptions::default()).unwrap();
        assert_eq!(program.manifest.triples, 1);
        assert_eq!(program.manifest.random_elements, 1);
        assert_eq!(program.manifest.random_bits, 0);
        assert_eq!(program.outputs[0].party, 0);
        // inputs, multiplication, opening, outputs
        assert_eq!(program.num_rounds(), 4);
    }

    #[test]
    fn test_color_name() {
        assert_eq!(color_name(1), Some("Red"));
        assert_eq!(color_name(6), Some("Purple"));
        assert_eq!(color_name(0), None);
        assert_eq!(color_name(7), None);
        assert_eq!(color_name(-1), None);
    }

    #[test]
    fn test_by_name() {
        assert!(by_name("guess_the_color").is_some());
        assert!(by_name("rock_paper_scissors").is_none());
    }
}
