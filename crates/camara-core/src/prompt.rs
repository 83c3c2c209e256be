//! Instruction prompt sent alongside the minutes text.

/// Fixed task framing for the model. Only the document text varies between
/// calls; it is sent as a separate input, never interpolated here.
pub const INSTRUCTION_PROMPT: &str = r#"Você é um assistente especializado em analisar documentos legislativos.
O texto a seguir é a ata de uma sessão da câmara de vereadores.

Analise o texto e, para CADA evento de votação, extraia as seguintes informações:
1. "id_projeto": o nome ou número do projeto votado.
2. "data_votacao": a data da ata (formato AAAA-MM-DD).
3. "objeto_da_votacao": uma breve descrição do que foi votado (ex: "Aprovação do Projeto de Lei", "Pedido de urgência referente ao Ofício X").
4. "projetos_relacionados": uma lista com o ID de TODOS os Projetos de Lei (PLs), Projetos de Decreto Legislativo (PDLs) ou similares mencionados em relação a essa votação.
5. "resumo": um pequeno resumo claro, objetivo e de fácil entendimento sobre o assunto votado.
6. "resultado": o resultado da votação (ex: "Aprovado por Unanimidade", "Rejeitado", etc.).
7. "votos": uma lista detalhada de como cada vereador presente na sessão votou (Sim, Não, Abstenção, Ausente).
   IMPORTANTE: se um vereador é listado como participante da votação, mas seu voto não é explicitamente declarado como contrário, abstenção ou ausente, considere que o voto foi "Sim".

Se alguma informação dos itens 2 a 5 não constar na ata, omita o campo.

Retorne sua resposta APENAS em formato de um array JSON, sem nenhum texto antes ou depois.
Se nenhuma votação for encontrada, retorne um array vazio: [].
Cada objeto no array deve representar uma votação e seguir esta estrutura:
{
  "id_projeto": "string",
  "data_votacao": "AAAA-MM-DD",
  "objeto_da_votacao": "string",
  "projetos_relacionados": ["string"],
  "resumo": "string",
  "resultado": "string",
  "votos": [
    { "vereador": "string", "voto": "string" }
  ]
}

Aqui está o texto para análise:
"#;
